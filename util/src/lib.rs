pub mod build;
mod macros;
