mod numeric;
mod param;
mod types;

pub use numeric::*;
pub use param::*;
pub use types::*;
