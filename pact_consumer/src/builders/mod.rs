//! Builders for constructing pacts and their interactions

mod http_part_builder;
mod request_builder;
mod response_builder;
mod interaction_builder;
mod message_builder;
mod pact_builder;

pub use http_part_builder::HttpPartBuilder;
pub use interaction_builder::{InteractionBuilder, InteractionPart};
pub use message_builder::MessageInteractionBuilder;
pub use pact_builder::PactBuilder;
pub use request_builder::RequestBuilder;
pub use response_builder::ResponseBuilder;
