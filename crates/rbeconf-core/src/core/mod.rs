//! Effectful building blocks: processes, the container sandbox, extraction
//! stages and output assembly.

pub mod assemble;
pub mod extract;
pub mod outcome;
pub mod process;
pub mod sandbox;
