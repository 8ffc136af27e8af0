pub mod catalog;
pub mod payment;

pub use catalog::*;
pub use payment::*;
