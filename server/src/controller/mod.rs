pub mod problemlist;
