//! Bucket file format, parsed with nom
//!
//! File layout:
//! ```text
//! SWCB001\n
//! [4 bytes: format version u32 little-endian]
//! [8 bytes: creation sequence u64 little-endian]
//! ...records...
//! ```
//!
//! Record layout (all integers little-endian):
//! ```text
//! [u8 op] [u32 key_len] key
//! PUT only:
//!   [u16 status] [u16 len] status_text
//!   [u16 header_count] ([u16 len] name [u32 len] value)*
//!   [u32 len] body
//! ```

use nom::{
    error::{Error as NomError, ErrorKind},
    multi::{count, length_data},
    number::complete::{le_u16, le_u32, le_u8},
    sequence::pair,
    IResult,
};

use crate::error::{Error, Result};

/// Magic header for bucket files
pub const BUCKET_MAGIC: &[u8] = b"SWCB001\n";

/// Current bucket file format version
pub const FORMAT_VERSION: u32 = 1;

/// Length of the fixed file header
pub const HEADER_LEN: usize = BUCKET_MAGIC.len() + 4 + 8;

/// Maximum stored body size (32 MB)
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Bucket file header
#[derive(Debug, Clone, PartialEq)]
pub struct BucketHeader {
    /// File format version
    pub version: u32,
    /// Creation order of the bucket within its storage directory
    pub created_seq: u64,
}

/// A response as persisted in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredResponse {
    /// HTTP status code
    pub status: u16,
    /// HTTP reason phrase
    pub status_text: String,
    /// Header name/value pairs in their original order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Create a response with a status and body and no headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Look up a header value, ignoring ASCII case of the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Borrowed view of a PUT payload
#[derive(Debug, PartialEq)]
pub struct ResponseRef<'a> {
    pub status: u16,
    pub status_text: &'a [u8],
    pub headers: Vec<(&'a [u8], &'a [u8])>,
    pub body: &'a [u8],
}

impl ResponseRef<'_> {
    /// Copy the borrowed payload into an owned response
    pub fn to_owned_response(&self) -> Result<StoredResponse> {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| Ok((utf8(name)?, utf8(value)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(StoredResponse {
            status: self.status,
            status_text: utf8(self.status_text)?,
            headers,
            body: self.body.to_vec(),
        })
    }
}

/// A single decoded record
#[derive(Debug, PartialEq)]
pub enum Record<'a> {
    /// Store (or replace) the response for a key
    Put {
        key: &'a [u8],
        response: ResponseRef<'a>,
    },
    /// Remove a key
    Delete { key: &'a [u8] },
}

impl<'a> Record<'a> {
    /// Key the record applies to
    pub fn key(&self) -> &'a [u8] {
        match self {
            Record::Put { key, .. } | Record::Delete { key } => *key,
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Parse(format!("invalid UTF-8: {}", e)))
}

/// Create a bucket file header
pub fn create_header(version: u32, created_seq: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(BUCKET_MAGIC);
    header.extend_from_slice(&version.to_le_bytes());
    header.extend_from_slice(&created_seq.to_le_bytes());
    header
}

/// Parse a bucket file header
pub fn parse_header(input: &[u8]) -> Result<BucketHeader> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    if &input[0..BUCKET_MAGIC.len()] != BUCKET_MAGIC {
        return Err(Error::Parse("Invalid bucket magic header".to_string()));
    }

    let rest = &input[BUCKET_MAGIC.len()..HEADER_LEN];
    let mut version = [0u8; 4];
    version.copy_from_slice(&rest[..4]);
    let mut created_seq = [0u8; 8];
    created_seq.copy_from_slice(&rest[4..12]);

    let header = BucketHeader {
        version: u32::from_le_bytes(version),
        created_seq: u64::from_le_bytes(created_seq),
    };

    if header.version != FORMAT_VERSION {
        return Err(Error::Parse(format!(
            "Unsupported bucket format version {}",
            header.version
        )));
    }

    Ok(header)
}

/// Parse one record from the front of `input`
pub fn parse_record(input: &[u8]) -> IResult<&[u8], Record<'_>> {
    let (input, op) = le_u8(input)?;
    let (input, key) = length_data(le_u32)(input)?;

    match op {
        OP_PUT => {
            let (input, status) = le_u16(input)?;
            let (input, status_text) = length_data(le_u16)(input)?;
            let (input, header_count) = le_u16(input)?;
            let (input, headers) = count(
                pair(length_data(le_u16), length_data(le_u32)),
                header_count as usize,
            )(input)?;
            let (input, body) = length_data(le_u32)(input)?;

            Ok((
                input,
                Record::Put {
                    key,
                    response: ResponseRef {
                        status,
                        status_text,
                        headers,
                        body,
                    },
                },
            ))
        }
        OP_DELETE => Ok((input, Record::Delete { key })),
        _ => Err(nom::Err::Failure(NomError::new(input, ErrorKind::Tag))),
    }
}

/// Encode a PUT record
pub fn encode_put(key: &str, response: &StoredResponse) -> Result<Vec<u8>> {
    check_len(key.len(), u32::MAX as usize)?;
    check_len(response.status_text.len(), u16::MAX as usize)?;
    check_len(response.headers.len(), u16::MAX as usize)?;
    check_len(response.body.len(), MAX_BODY_SIZE)?;

    let mut out = Vec::with_capacity(32 + key.len() + response.body.len());
    out.push(OP_PUT);
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(&response.status.to_le_bytes());
    out.extend_from_slice(&(response.status_text.len() as u16).to_le_bytes());
    out.extend_from_slice(response.status_text.as_bytes());
    out.extend_from_slice(&(response.headers.len() as u16).to_le_bytes());
    for (name, value) in &response.headers {
        check_len(name.len(), u16::MAX as usize)?;
        check_len(value.len(), u32::MAX as usize)?;
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    out.extend_from_slice(&(response.body.len() as u32).to_le_bytes());
    out.extend_from_slice(&response.body);
    Ok(out)
}

/// Encode a DELETE record
pub fn encode_delete(key: &str) -> Result<Vec<u8>> {
    check_len(key.len(), u32::MAX as usize)?;

    let mut out = Vec::with_capacity(5 + key.len());
    out.push(OP_DELETE);
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    Ok(out)
}

fn check_len(len: usize, max: usize) -> Result<()> {
    if len > max {
        Err(Error::ValueTooLarge(len))
    } else {
        Ok(())
    }
}
