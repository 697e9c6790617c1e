//! Scripted transport for unit tests

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Send,
    Recv,
    PayloadOut,
    PayloadIn,
    Reset,
}

/// Records every transfer and replays queued replies in order
#[derive(Debug, Default)]
pub struct MockTransport {
    pub log: Vec<(Channel, Vec<u8>)>,
    replies: VecDeque<Vec<u8>>,
    payloads: VecDeque<Vec<u8>>,
    pub fail_send_at: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message-channel reply (zero-padded to the receive length)
    pub fn reply(&mut self, bytes: &[u8]) -> &mut Self {
        self.replies.push_back(bytes.to_vec());
        self
    }

    /// Queue a payload-channel reply
    pub fn payload(&mut self, bytes: &[u8]) -> &mut Self {
        self.payloads.push_back(bytes.to_vec());
        self
    }

    /// Queue a status reply with the given overcurrent byte
    pub fn status_reply(&mut self, overcurrent: u8) -> &mut Self {
        let mut reply = [0u8; 32];
        reply[12] = overcurrent;
        self.reply(&reply)
    }

    /// Queue a system-info reply reporting `status` and `firmware`
    pub fn info_reply(&mut self, status: u8, firmware: u16) -> &mut Self {
        let mut reply = [0u8; 64];
        reply[1] = status;
        reply[4..6].copy_from_slice(&firmware.to_le_bytes());
        reply[6] = 7;
        reply[8..16].copy_from_slice(b"T48-TEST");
        self.reply(&reply)
    }

    pub fn sent(&self) -> Vec<&[u8]> {
        self.frames(Channel::Send)
    }

    pub fn frames(&self, channel: Channel) -> Vec<&[u8]> {
        self.log
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, b)| b.as_slice())
            .collect()
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.log.iter().filter(|(c, _)| *c == channel).count()
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }
}

fn fill(buf: &mut [u8], reply: Option<Vec<u8>>) -> Result<()> {
    let reply = reply.ok_or_else(|| Error::Transport("no reply queued".to_string()))?;
    buf.fill(0);
    let n = reply.len().min(buf.len());
    buf[..n].copy_from_slice(&reply[..n]);
    Ok(())
}

impl Transport for MockTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.fail_send_at == Some(self.count(Channel::Send)) {
            return Err(Error::Transport("send failed".to_string()));
        }
        self.log.push((Channel::Send, data.to_vec()));
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        fill(buf, self.replies.pop_front())?;
        self.log.push((Channel::Recv, buf.to_vec()));
        Ok(())
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        self.log.push((Channel::PayloadOut, data.to_vec()));
        Ok(())
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        fill(buf, self.payloads.pop_front())?;
        self.log.push((Channel::PayloadIn, buf.to_vec()));
        Ok(())
    }

    fn reset_and_reopen(&mut self) -> Result<()> {
        self.log.push((Channel::Reset, Vec::new()));
        Ok(())
    }
}
