// Pipeline processing: monotonicity checks, densification, and differencing

pub mod validator;
pub mod duplicates;
pub mod grid;
pub mod differencer;
