pub mod info;
pub mod make;

pub use info::*;
pub use make::*;
