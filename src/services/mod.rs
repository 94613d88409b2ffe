pub mod auth_service;
pub mod billing_service;
pub mod document_service;
pub mod email_service;
pub mod file_service;
pub mod gateway_service;

pub use auth_service::AuthService;
pub use document_service::DocumentService;
pub use email_service::EmailService;
pub use file_service::FileService;
pub use gateway_service::GatewayService;
