pub mod token;

pub use token::StoredToken;
