mod error;
mod lexer;

pub use error::*;
pub use lexer::*;

#[cfg(test)]
mod token_test;
