//! Value object errors

mod value_error;

pub use value_error::ValueError;
