pub mod handlers;
pub mod response;
pub mod server;
pub mod validation;


pub use handlers::AppState;
pub use response::ApiResponse;
pub use server::{create_router, ApiServer};
