mod error;
mod link;
