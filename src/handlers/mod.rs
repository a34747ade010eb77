pub mod cleanup_handlers;
pub mod gallery_handlers;
pub mod generate_handlers;
pub mod health_handlers;
pub mod object_handlers;
