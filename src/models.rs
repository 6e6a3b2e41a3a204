//! These models represent the objects passed around by the agent
//!
//! The internal message format mirrors the content-block shape used by
//! tool-capable chat models: a message carries an ordered list of blocks,
//! where a block is plain text, a tool invocation requested by the model,
//! or the result of a tool invocation fed back to the model. Providers
//! convert to and from their wire formats at the edge; everything inside
//! the crate works on these structs.
pub mod message;
pub mod tool;
