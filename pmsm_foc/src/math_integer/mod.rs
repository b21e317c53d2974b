pub mod q15;
pub mod trigonometry;
pub mod transforms;
pub mod svm;
pub mod normalization;
pub mod filters;
pub mod controllers;
pub mod sample_ring;
