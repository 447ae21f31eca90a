pub mod fixtures;
mod semantic;
mod web;
