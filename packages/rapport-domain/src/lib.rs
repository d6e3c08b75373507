pub mod duplicates;
pub mod generation;
pub mod preference;
pub mod question;
pub mod relation;
pub mod selection;
pub mod shuffle;
pub mod vector;
