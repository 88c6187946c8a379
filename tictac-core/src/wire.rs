//! Text codec: `MOVE|r|c`, `GAMEOVER|m`, `DRAW`. Decoding is total.

use crate::protocol::{Message, DRAW_TAG, GAME_OVER_TAG, MOVE_TAG, SEPARATOR};

/// Encode a message as its wire text. `Malformed` encodes to its raw text.
pub fn encode(msg: &Message) -> String {
    match msg {
        Message::Move { row, col } => format!("{MOVE_TAG}{SEPARATOR}{row}{SEPARATOR}{col}"),
        Message::GameOver(mark) => format!("{GAME_OVER_TAG}{SEPARATOR}{mark}"),
        Message::Draw => DRAW_TAG.to_string(),
        Message::Malformed(raw) => raw.clone(),
    }
}

/// Decode wire text. Anything outside the three grammars becomes `Message::Malformed`.
pub fn decode(text: &str) -> Message {
    parse(text.trim()).unwrap_or_else(|| Message::Malformed(text.to_string()))
}

/// Decode raw bytes; invalid UTF-8 is malformed.
pub fn decode_bytes(bytes: &[u8]) -> Message {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode(text),
        Err(_) => Message::Malformed(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn parse(text: &str) -> Option<Message> {
    let fields: Vec<&str> = text.split(SEPARATOR).collect();
    match fields.as_slice() {
        [tag, row, col] if *tag == MOVE_TAG => Some(Message::Move {
            row: parse_coord(row)?,
            col: parse_coord(col)?,
        }),
        [tag, mark] if *tag == GAME_OVER_TAG => {
            let mut chars = mark.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Message::GameOver(c)),
                _ => None,
            }
        }
        [tag] if *tag == DRAW_TAG => Some(Message::Draw),
        _ => None,
    }
}

// Digits only: u8::from_str would also accept a leading '+'.
fn parse_coord(s: &str) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
