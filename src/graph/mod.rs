pub mod conversion;
pub mod definition;
pub mod params;

pub use conversion::*;
pub use definition::*;
pub use params::*;
