pub mod cloud_image;
pub mod details;
pub mod handler;
pub mod id_provider;
pub mod instance;

pub use cloud_image::CloudImage;
pub use details::{CloneBehaviour, ImageDetails};
pub use handler::ImageHandler;
pub use id_provider::{FileIdProvider, IdProvider};
pub use instance::CloudInstance;
