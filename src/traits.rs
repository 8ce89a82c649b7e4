use anyhow::Result;

#[cfg_attr(test, mockall::automock)]
pub trait SampleSource {
    /// Prepare the source (bind sockets, reset generators). Called once before receiving.
    fn setup(&mut self) -> Result<()> { Ok(()) }

    /// Receive one raw datagram. Returns Ok(Some(bytes)) if one arrived.
    /// Returns Ok(None) if nothing arrived before the receive timeout.
    fn receive_batch(&mut self) -> Result<Option<Vec<u8>>>;
}
