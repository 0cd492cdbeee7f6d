pub mod mr;
