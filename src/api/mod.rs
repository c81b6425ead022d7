pub mod folders;
pub mod health;
pub mod metadata;
pub mod subscription;
pub mod swagger;
pub mod tools;
pub mod users;
pub mod webhooks;
