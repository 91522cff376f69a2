//! Command implementations for obdscan

pub mod decode;
pub mod profiles;
pub mod scan;

pub use decode::decode;
pub use profiles::profiles;
pub use scan::scan;
