mod nodes;
mod parser;

pub use nodes::*;
pub use parser::{Parser, parse_expr, parse_file};

#[cfg(test)]
mod ast_test;
