pub mod image_io;
pub mod ser;
pub mod ser_writer;

pub use image_io::{load_image, save_image};
pub use ser::{SerColor, SerHeader, SerReader};
pub use ser_writer::SerWriter;
