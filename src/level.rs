//! Block storage and the level transfer sent after login.
//!
//! A transfer is `LevelInitialize`, then the compressed block array in
//! 1024-byte `LevelDataChunk`s, then `LevelFinalize` with the dimensions.

use crate::{
    client_handle::ClientHandle,
    position::{BlockId, BlockPosition},
    protocol::{
        layout::LevelEncoding,
        packet::server::{LevelDataChunk, LevelFinalize, LevelInitialize, LEVEL_CHUNK_LENGTH},
    },
};
use anyhow::Context;
use std::borrow::Cow;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use std::io::Write;

/// A box of blocks, stored x-fastest, then z, then y.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    width: i16,
    height: i16,
    length: i16,
    blocks: Vec<u8>,
}

impl Level {
    /// An all-air level. Negative dimensions are treated as zero.
    pub fn new(width: i16, height: i16, length: i16) -> Self {
        let volume = [width, height, length]
            .into_iter()
            .map(|d| usize::try_from(d).unwrap_or(0))
            .product();
        Self {
            width: width.max(0),
            height: height.max(0),
            length: length.max(0),
            blocks: vec![0; volume],
        }
    }

    /// Bedrock at the bottom, dirt up to just below the middle, grass on
    /// top of that.
    pub fn flat(width: i16, height: i16, length: i16) -> Self {
        let mut level = Self::new(width, height, length);
        let surface = level.height / 2;
        for y in 0..surface {
            let block = match y {
                0 => BlockId::BEDROCK,
                y if y == surface - 1 => BlockId::GRASS,
                _ => BlockId::DIRT,
            };
            for z in 0..level.length {
                for x in 0..level.width {
                    level.set(BlockPosition::new(x, y, z), block);
                }
            }
        }
        level
    }

    pub fn dimensions(&self) -> (i16, i16, i16) {
        (self.width, self.height, self.length)
    }

    pub fn volume(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[u8] {
        &self.blocks
    }

    /// The block array as a peer sees it. Without custom block support,
    /// custom blocks are replaced by their classic fallbacks.
    pub fn blocks_for(&self, custom_blocks: bool) -> Cow<'_, [u8]> {
        let max = BlockId::MAX_CLASSIC.0;
        if custom_blocks || self.blocks.iter().all(|&b| u16::from(b) <= max) {
            return Cow::Borrowed(&self.blocks);
        }
        self.blocks
            .iter()
            .map(|&b| BlockId(u16::from(b)).fallback().0 as u8)
            .collect()
    }

    fn index(&self, position: BlockPosition) -> Option<usize> {
        let BlockPosition { x, y, z } = position;
        if !(0..self.width).contains(&x)
            || !(0..self.height).contains(&y)
            || !(0..self.length).contains(&z)
        {
            return None;
        }
        let [x, y, z, width, length] =
            [x, y, z, self.width, self.length].map(|v| v as usize);
        Some((y * length + z) * width + x)
    }

    pub fn contains(&self, position: BlockPosition) -> bool {
        self.index(position).is_some()
    }

    /// Air outside the level.
    pub fn get(&self, position: BlockPosition) -> BlockId {
        self.index(position)
            .map_or(BlockId::AIR, |i| BlockId(u16::from(self.blocks[i])))
    }

    /// Returns `false` (and changes nothing) outside the level.
    pub fn set(&mut self, position: BlockPosition, block: BlockId) -> bool {
        match self.index(position) {
            Some(i) => {
                self.blocks[i] = u8::try_from(block.0).unwrap_or(u8::MAX);
                true
            }
            None => false,
        }
    }

    /// Where players appear: centered, one block above the surface.
    pub fn spawn_point(&self) -> BlockPosition {
        let (x, z) = (self.width / 2, self.length / 2);
        let y = (0..self.height)
            .rev()
            .find(|&y| self.get(BlockPosition::new(x, y, z)) != BlockId::AIR)
            .map_or(0, |y| y + 1);
        BlockPosition::new(x, y, z)
    }

    pub fn finalize(&self) -> LevelFinalize {
        LevelFinalize {
            width: self.width,
            height: self.height,
            length: self.length,
        }
    }
}

/// Compresses a block array for transfer.
///
/// `Gzip` wraps the volume (big-endian `i32`) followed by the blocks;
/// `Deflate` is the raw blocks only.
pub fn compress(blocks: &[u8], encoding: LevelEncoding) -> anyhow::Result<Vec<u8>> {
    match encoding {
        LevelEncoding::Gzip => {
            let volume = i32::try_from(blocks.len()).context("level too large")?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&volume.to_be_bytes())?;
            encoder.write_all(blocks)?;
            Ok(encoder.finish()?)
        }
        LevelEncoding::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(blocks)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Splits a payload into level chunks. Percentages never decrease and the
/// last chunk always reports 100; an empty payload gives one empty chunk.
pub fn chunks(payload: &[u8]) -> Chunks<'_> {
    Chunks {
        payload,
        offset: 0,
        done: false,
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    payload: &'a [u8],
    offset: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = LevelDataChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let total = self.payload.len();
        let end = (self.offset + LEVEL_CHUNK_LENGTH).min(total);
        let data = &self.payload[self.offset..end];
        self.offset = end;
        self.done = end == total;

        let percent_complete = if self.done {
            100
        } else {
            u8::try_from(end * 100 / total).unwrap_or(100)
        };
        let mut padded = data.to_vec();
        padded.resize(LEVEL_CHUNK_LENGTH, 0);
        Some(LevelDataChunk {
            length: data.len() as u16,
            data: padded,
            percent_complete,
        })
    }
}

/// Sends `level` to one client, compressed the way its layout asks for.
pub fn send_level(handle: &ClientHandle, level: &Level, custom_blocks: bool) -> anyhow::Result<()> {
    let encoding = handle.layout().level;
    let payload = compress(&level.blocks_for(custom_blocks), encoding)?;

    handle.send(LevelInitialize {
        volume: u32::try_from(level.volume()).context("level too large")?,
    });
    for chunk in chunks(&payload) {
        handle.send(chunk);
    }
    handle.send(level.finalize());
    tracing::debug!(
        id = %handle.id(),
        "Sent level of {} blocks in {} bytes",
        level.volume(),
        payload.len()
    );
    Ok(())
}
