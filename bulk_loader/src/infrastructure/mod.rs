pub mod sorter;
pub mod writer;
