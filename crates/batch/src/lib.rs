pub mod config;
pub mod encoder;
pub mod store;

pub use config::BatchConfig;
pub use encoder::JpegEncoder;
pub use store::BatchStore;
