pub mod encoder;
pub mod handler;
pub mod logo;
pub mod output;
pub mod params;

pub use handler::create_qr_router;
pub use output::QrRaster;
pub use params::{QrQuery, QrRequest};
