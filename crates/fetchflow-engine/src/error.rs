use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("signal channel closed")]
  ChannelClosed,
}
