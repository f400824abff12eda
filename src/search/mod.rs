pub mod hybrid;
pub mod keyword;
pub mod vector;
