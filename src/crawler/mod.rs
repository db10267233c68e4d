pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod mapper;
pub mod model;
pub mod pipeline;
pub mod validator;
