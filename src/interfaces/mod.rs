//! Outer surfaces of the command-line tool: the command file reader and the
//! earnings report writer.

pub mod csv;
pub mod jsonl;
