pub mod models;
pub mod numeric;
pub mod raw;
pub mod traits;

pub use models::*;
pub use numeric::*;
pub use raw::*;
pub use traits::*;
