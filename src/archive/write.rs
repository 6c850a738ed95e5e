use cookie_factory::bytes::{le_f32, le_i64, le_u16, le_u32, le_u8};
use cookie_factory::combinator::{slice, string};
use cookie_factory::multi::all;
use cookie_factory::sequence::tuple;
use cookie_factory::*;
use log::{debug, trace};

use super::{ArchiveWriter, ArrayData, NdArray, Record};
use crate::{Error, Result};

use std::fs;
use std::io::Write;
use std::path::Path;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

const LOCAL_HEADER: u32 = 0x0403_4b50;
const CENTRAL_HEADER: u32 = 0x0201_4b50;
const END_OF_DIRECTORY: u32 = 0x0605_4b50;
const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const ZIP_VERSION: u16 = 20;
const STORED: u16 = 0;
// 1980-01-01, the earliest date a zip entry can carry
const DOS_DATE: u16 = (1 << 5) | 1;

impl ArrayData {
    fn descr(&self) -> String {
        match self {
            ArrayData::F32(_) => "<f4".into(),
            ArrayData::I64(_) => "<i8".into(),
            ArrayData::Str(v) => format!("<U{}", string_width(v)),
        }
    }
}

fn string_width(values: &[String]) -> usize {
    values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1)
}

fn npy_header(array: &NdArray) -> String {
    let shape = match array.shape() {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        array.data().descr(),
        shape
    );
    // magic, version and length come first; the whole preamble ends on a
    // 64 byte boundary with a newline
    let used = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (NPY_ALIGN - used % NPY_ALIGN) % NPY_ALIGN;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');
    header
}

/// Fixed-width UTF-32, zero padded, the layout of numpy's `<U` dtype.
fn utf32<'a, W: Write + 'a>(value: &'a str, width: usize) -> impl SerializeFn<W> + 'a {
    move |out: WriteContext<W>| {
        let used = value.chars().count();
        let out = all(value.chars().map(|c| le_u32(c as u32)))(out)?;
        all(std::iter::repeat(0u32).take(width - used).map(|c| le_u32(c)))(out)
    }
}

fn npy_body<'a, W: Write + 'a>(data: &'a ArrayData) -> impl SerializeFn<W> + 'a {
    move |out: WriteContext<W>| match data {
        ArrayData::F32(v) => all(v.iter().map(|x| le_f32(*x)))(out),
        ArrayData::I64(v) => all(v.iter().map(|x| le_i64(*x)))(out),
        ArrayData::Str(v) => {
            let width = string_width(v);
            let out = all(v.iter().map(move |s| utf32(s, width)))(out);
            out
        }
    }
}

fn npy<'a, W: Write + 'a>(array: &'a NdArray, header: &'a str) -> impl SerializeFn<W> + 'a {
    tuple((
        slice(NPY_MAGIC),
        le_u8(1),
        le_u8(0),
        le_u16(header.len() as u16),
        string(header),
        npy_body(array.data()),
    ))
}

/// Encodes one array as a version 1.0 `.npy` file.
pub fn npy_bytes(array: &NdArray) -> Result<Vec<u8>> {
    let header = npy_header(array);
    gen_simple(npy(array, &header), Vec::new()).map_err(serialize_error)
}

struct Member {
    name: String,
    data: Vec<u8>,
    crc: u32,
    offset: u32,
}

impl Member {
    fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

fn local_entry<'a, W: Write + 'a>(m: &'a Member) -> impl SerializeFn<W> + 'a {
    tuple((
        tuple((
            le_u32(LOCAL_HEADER),
            le_u16(ZIP_VERSION),
            le_u16(0),
            le_u16(STORED),
            le_u16(0),
            le_u16(DOS_DATE),
        )),
        tuple((
            le_u32(m.crc),
            le_u32(m.size()),
            le_u32(m.size()),
            le_u16(m.name.len() as u16),
            le_u16(0),
            string(&m.name),
            slice(&m.data),
        )),
    ))
}

fn central_entry<'a, W: Write + 'a>(m: &'a Member) -> impl SerializeFn<W> + 'a {
    tuple((
        tuple((
            le_u32(CENTRAL_HEADER),
            le_u16(ZIP_VERSION),
            le_u16(ZIP_VERSION),
            le_u16(0),
            le_u16(STORED),
            le_u16(0),
            le_u16(DOS_DATE),
            le_u32(m.crc),
            le_u32(m.size()),
            le_u32(m.size()),
        )),
        tuple((
            le_u16(m.name.len() as u16),
            le_u16(0),
            le_u16(0),
            le_u16(0),
            le_u16(0),
            le_u32(0),
            le_u32(m.offset),
            string(&m.name),
        )),
    ))
}

fn end_of_directory<W: Write>(entries: u16, size: u32, offset: u32) -> impl SerializeFn<W> {
    tuple((
        le_u32(END_OF_DIRECTORY),
        le_u16(0),
        le_u16(0),
        le_u16(entries),
        le_u16(entries),
        le_u32(size),
        le_u32(offset),
        le_u16(0),
    ))
}

fn fits_u32(n: usize, what: &str) -> Result<u32> {
    if n > u32::MAX as usize {
        return Err(Error::Serialize(format!("{} exceeds 4 GiB", what)));
    }
    Ok(n as u32)
}

/// Encodes a record as an uncompressed `.npz`: one `<key>.npy` zip member per
/// array, in record order.
pub fn npz_bytes(record: &Record) -> Result<Vec<u8>> {
    if record.len() > u16::MAX as usize {
        return Err(Error::Serialize(format!("{} arrays in one archive", record.len())));
    }
    let mut members = Vec::with_capacity(record.len());
    let mut offset = 0usize;
    for (key, array) in record.iter() {
        let data = npy_bytes(array)?;
        fits_u32(data.len(), key)?;
        let member = Member {
            name: format!("{}.npy", key),
            crc: crc32fast::hash(&data),
            offset: fits_u32(offset, "archive")?,
            data,
        };
        trace!("{}: {} bytes at {}", member.name, member.data.len(), offset);
        offset += LOCAL_HEADER_LEN + member.name.len() + member.data.len();
        members.push(member);
    }
    let directory: usize = members
        .iter()
        .map(|m| CENTRAL_HEADER_LEN + m.name.len())
        .sum();

    gen_simple(
        tuple((
            all(members.iter().map(|m| local_entry(m))),
            all(members.iter().map(|m| central_entry(m))),
            end_of_directory(
                members.len() as u16,
                fits_u32(directory, "central directory")?,
                fits_u32(offset, "archive")?,
            ),
        )),
        Vec::new(),
    )
    .map_err(serialize_error)
}

pub(super) fn serialize_error(e: GenError) -> Error {
    Error::Serialize(format!("{:?}", e))
}

/// Writes records as NumPy `.npz` archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NpzWriter;

impl ArchiveWriter for NpzWriter {
    fn extension(&self) -> &'static str {
        "npz"
    }

    fn write(&self, record: &Record, path: &Path) -> Result<()> {
        let bytes = npz_bytes(record)?;
        fs::write(path, &bytes)?;
        debug!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}
