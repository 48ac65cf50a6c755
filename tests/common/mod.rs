//! Builds small ZIP archives in memory for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::ops::Range;

use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use flate2::Compression;

pub const STORED: u16 = 0;
pub const DEFLATE: u16 = 8;

pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A file to put in the archive
#[derive(Clone)]
pub struct Member {
    pub name: Vec<u8>,
    pub contents: Vec<u8>,
    pub method: u16,
    pub flags: u16,
    /// Written into the local header only
    pub local_extra: Vec<u8>,
    /// Overrides the method written into the central directory
    pub central_method: Option<u16>,
    /// Overrides the flags written into the local header
    pub local_flags: Option<u16>,
}

impl Member {
    pub fn stored(name: &str, contents: &[u8]) -> Self {
        Self::new(name, contents, STORED)
    }

    pub fn deflated(name: &str, contents: &[u8]) -> Self {
        Self::new(name, contents, DEFLATE)
    }

    pub fn new(name: &str, contents: &[u8], method: u16) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            contents: contents.to_vec(),
            method,
            flags: 0,
            local_extra: Vec::new(),
            central_method: None,
            local_flags: None,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self.method {
            DEFLATE => deflate(&self.contents),
            // Anything else we just store, whatever the header claims.
            _ => self.contents.clone(),
        }
    }
}

/// An archive we built, along with where things landed in it.
pub struct Fixture {
    pub bytes: Vec<u8>,
    /// Each member's compressed data
    pub payloads: Vec<Range<usize>>,
    /// Each member's local header
    pub local_headers: Vec<usize>,
    pub central_directory: usize,
    pub eocdr: usize,
}

#[derive(Default)]
pub struct ArchiveBuilder {
    members: Vec<Member>,
    comment: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn build(&self) -> Fixture {
        let mut bytes = Vec::new();
        let mut payloads = Vec::new();
        let mut local_headers = Vec::new();
        let mut sizes = Vec::new();

        // 2021-06-15 13:45:30
        let date: u16 = ((2021 - 1980) << 9) | (6 << 5) | 15;
        let time: u16 = (13 << 11) | (45 << 5) | 15;

        for member in &self.members {
            let payload = member.payload();
            let crc = crc32(&member.contents);
            local_headers.push(bytes.len());

            bytes.extend_from_slice(b"PK\x03\x04");
            bytes.extend_from_slice(&20u16.to_le_bytes());
            bytes.extend_from_slice(&member.local_flags.unwrap_or(member.flags).to_le_bytes());
            bytes.extend_from_slice(&member.method.to_le_bytes());
            bytes.extend_from_slice(&time.to_le_bytes());
            bytes.extend_from_slice(&date.to_le_bytes());
            bytes.extend_from_slice(&crc.to_le_bytes());
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&(member.contents.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&(member.name.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&(member.local_extra.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&member.name);
            bytes.extend_from_slice(&member.local_extra);

            let start = bytes.len();
            bytes.extend_from_slice(&payload);
            payloads.push(start..bytes.len());
            sizes.push((crc, payload.len() as u32));
        }

        let central_directory = bytes.len();
        for ((member, (crc, compressed_size)), header_offset) in
            self.members.iter().zip(&sizes).zip(&local_headers)
        {
            bytes.extend_from_slice(b"PK\x01\x02");
            bytes.extend_from_slice(&0x031eu16.to_le_bytes());
            bytes.extend_from_slice(&20u16.to_le_bytes());
            bytes.extend_from_slice(&member.flags.to_le_bytes());
            bytes.extend_from_slice(&member.central_method.unwrap_or(member.method).to_le_bytes());
            bytes.extend_from_slice(&time.to_le_bytes());
            bytes.extend_from_slice(&date.to_le_bytes());
            bytes.extend_from_slice(&crc.to_le_bytes());
            bytes.extend_from_slice(&compressed_size.to_le_bytes());
            bytes.extend_from_slice(&(member.contents.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&(member.name.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes()); // extra field
            bytes.extend_from_slice(&0u16.to_le_bytes()); // comment
            bytes.extend_from_slice(&0u16.to_le_bytes()); // disk
            bytes.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            bytes.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            bytes.extend_from_slice(&(*header_offset as u32).to_le_bytes());
            bytes.extend_from_slice(&member.name);
        }
        let central_directory_size = bytes.len() - central_directory;

        let eocdr = bytes.len();
        let count = self.members.len() as u16;
        bytes.extend_from_slice(b"PK\x05\x06");
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&(central_directory_size as u32).to_le_bytes());
        bytes.extend_from_slice(&(central_directory as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&self.comment);

        Fixture {
            bytes,
            payloads,
            local_headers,
            central_directory,
            eocdr,
        }
    }
}

/// The two-file archive from the docs: a stored `a.txt` and a deflated `b.txt`.
pub fn hello_archive() -> Fixture {
    ArchiveBuilder::new()
        .member(Member::stored("a.txt", b"hi"))
        .member(Member::deflated("b.txt", b"hello world"))
        .build()
}
