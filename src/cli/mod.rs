pub mod args;

use clap::Parser;
pub use args::{Arguments, FieldGroup};

pub fn parse() -> Arguments {
    Arguments::parse()
}
