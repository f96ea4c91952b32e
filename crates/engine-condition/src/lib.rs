//! Tokenizer and recursive-descent evaluator for the condition grammar
//! (component C2).

mod error;
mod lexer;
mod parser;

pub use error::{Error, Result};
pub use parser::evaluate;
