//! Conversions between axum WebSocket messages and relay frames.

use std::borrow::Cow;

use axum::extract::ws::{CloseFrame, Message};

use crate::relay::{CloseReason, Frame};

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            Message::Ping(_) => Frame::Ping,
            Message::Pong(_) => Frame::Pong,
            Message::Close(close) => Frame::Close(close.map(|c| CloseReason {
                code: c.code,
                reason: Cow::Owned(c.reason.as_str().to_owned()),
            })),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Ping => Message::Ping(Default::default()),
            Frame::Pong => Message::Pong(Default::default()),
            Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
                code: r.code,
                reason: r.reason.into_owned().into(),
            })),
        }
    }
}
