//! Output container: a tagged binary record stream holding the grid
//! description, per-bin index, bin list, and per-product values this
//! crate produces, written with the same "length-prefixed tagged record"
//! shape as the teacher's own DMAP encoder.
//!
//! Grounded on the teacher's root `src/lib.rs`: `RawDmapRecord::to_bytes`
//! writes a record as `[code][size][body]`, and `DmapType::to_bytes`
//! writes each scalar/array field as `[name][type][data]` using
//! `bytemuck::bytes_of` for the POD payload. This module keeps that same
//! tag/length/body shape but defines its own four record kinds (SEAGrid,
//! BinIndex, BinList, Product) instead of DMAP's generic scalar/array
//! records, since the output here is a fixed schema, not a self-describing
//! field bag.

use std::io::{self, Write};

use indexmap::IndexMap;

/// One of the four record kinds written to the container, identified by a
/// 4-byte tag so a reader can skip unknown future record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    SeaGrid,
    BinIndex,
    BinList,
    Product,
    GlobalAttrs,
}

impl RecordTag {
    fn code(self) -> [u8; 4] {
        match self {
            RecordTag::SeaGrid => *b"SGRD",
            RecordTag::BinIndex => *b"BIDX",
            RecordTag::BinList => *b"BLST",
            RecordTag::Product => *b"PROD",
            RecordTag::GlobalAttrs => *b"ATTR",
        }
    }
}

/// Grid description record: one per output file, written first.
#[derive(Debug, Clone)]
pub struct SeaGridRecord {
    pub nrows: u32,
    pub total_bins: u64,
}

/// Per-row index: the first global bin number in the row and how many of
/// the row's bins were actually filled, mirroring l2bin's BinIndex.
#[derive(Debug, Clone, Copy)]
pub struct BinIndexRecord {
    pub row_num: u32,
    pub beg: u64,
    pub ext: u32,
}

/// One filled bin's metadata, independent of which products it carries.
#[derive(Debug, Clone, Copy)]
pub struct BinListRecord {
    pub bin: i64,
    pub nobs: u32,
    pub nscenes: u32,
    pub time_rec: f32,
    pub weight: f32,
    pub sel_cat: u8,
    pub flags_set: u32,
}

/// SUM/SUM_SQ pair for one product, for one filled bin, in the same order
/// as the preceding `BinListRecord` stream.
#[derive(Debug, Clone, Copy)]
pub struct ProductRecord {
    pub sum: f32,
    pub sum_sq: f32,
}

/// Streaming container writer. Records are appended in the fixed order
/// SeaGrid, BinIndex*, BinList*, then Product* (once per bound product, in
/// `l3bprod` order), matching the original file's section layout.
pub struct ContainerWriter<W: Write> {
    out: W,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(out: W) -> ContainerWriter<W> {
        ContainerWriter { out }
    }

    fn write_record(&mut self, tag: RecordTag, body: &[u8]) -> io::Result<()> {
        self.out.write_all(&tag.code())?;
        self.out.write_all(&(body.len() as u32).to_le_bytes())?;
        self.out.write_all(body)
    }

    pub fn write_sea_grid(&mut self, rec: &SeaGridRecord) -> io::Result<()> {
        let mut body = Vec::with_capacity(12);
        body.extend_from_slice(bytemuck::bytes_of(&rec.nrows));
        body.extend_from_slice(bytemuck::bytes_of(&rec.total_bins));
        self.write_record(RecordTag::SeaGrid, &body)
    }

    pub fn write_bin_index(&mut self, rec: &BinIndexRecord) -> io::Result<()> {
        let mut body = Vec::with_capacity(16);
        body.extend_from_slice(bytemuck::bytes_of(&rec.row_num));
        body.extend_from_slice(bytemuck::bytes_of(&rec.beg));
        body.extend_from_slice(bytemuck::bytes_of(&rec.ext));
        self.write_record(RecordTag::BinIndex, &body)
    }

    pub fn write_bin_list(&mut self, rec: &BinListRecord) -> io::Result<()> {
        let mut body = Vec::with_capacity(29);
        body.extend_from_slice(bytemuck::bytes_of(&rec.bin));
        body.extend_from_slice(bytemuck::bytes_of(&rec.nobs));
        body.extend_from_slice(bytemuck::bytes_of(&rec.nscenes));
        body.extend_from_slice(bytemuck::bytes_of(&rec.time_rec));
        body.extend_from_slice(bytemuck::bytes_of(&rec.weight));
        body.push(rec.sel_cat);
        body.extend_from_slice(bytemuck::bytes_of(&rec.flags_set));
        self.write_record(RecordTag::BinList, &body)
    }

    pub fn write_product(&mut self, rec: &ProductRecord) -> io::Result<()> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(bytemuck::bytes_of(&rec.sum));
        body.extend_from_slice(bytemuck::bytes_of(&rec.sum_sq));
        self.write_record(RecordTag::Product, &body)
    }

    /// Writes the global attribute block: an ordered key/value string
    /// table (processing parameters, input file list, product names),
    /// using `IndexMap` to preserve insertion order the way the teacher's
    /// DMAP field table preserves on-disk field order.
    pub fn write_global_attrs(&mut self, attrs: &IndexMap<String, String>) -> io::Result<()> {
        let mut body = Vec::new();
        body.extend_from_slice(&(attrs.len() as u32).to_le_bytes());
        for (k, v) in attrs {
            body.extend_from_slice(&(k.len() as u32).to_le_bytes());
            body.extend_from_slice(k.as_bytes());
            body.extend_from_slice(&(v.len() as u32).to_le_bytes());
            body.extend_from_slice(v.as_bytes());
        }
        self.write_record(RecordTag::GlobalAttrs, &body)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_tagged_records_with_length_prefix() {
        let mut buf = Vec::new();
        {
            let mut w = ContainerWriter::new(&mut buf);
            w.write_sea_grid(&SeaGridRecord {
                nrows: 2160,
                total_bins: 5_940_422,
            })
            .unwrap();
        }
        assert_eq!(&buf[0..4], b"SGRD");
        let len = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        assert_eq!(len as usize, 12);
        assert_eq!(buf.len(), 8 + 12);
    }

    #[test]
    fn bin_list_record_round_trips_fields() {
        let mut buf = Vec::new();
        let rec = BinListRecord {
            bin: 123_456,
            nobs: 7,
            nscenes: 2,
            time_rec: 12.5,
            weight: 3.25,
            sel_cat: 0b0110,
            flags_set: 0xdead_beef,
        };
        {
            let mut w = ContainerWriter::new(&mut buf);
            w.write_bin_list(&rec).unwrap();
        }
        let body = &buf[8..];
        let bin = i64::from_le_bytes(body[0..8].try_into().unwrap());
        assert_eq!(bin, 123_456);
        assert_eq!(body[28], 0b0110);
    }

    #[test]
    fn multiple_records_concatenate_without_overlap() {
        let mut buf = Vec::new();
        {
            let mut w = ContainerWriter::new(&mut buf);
            w.write_product(&ProductRecord { sum: 1.0, sum_sq: 1.0 }).unwrap();
            w.write_product(&ProductRecord { sum: 2.0, sum_sq: 4.0 }).unwrap();
        }
        assert_eq!(&buf[0..4], b"PROD");
        assert_eq!(&buf[16..20], b"PROD");
    }
}
