pub mod pager;
pub mod table;
