mod common;
mod quote;
