//! splat_ply: dependency-light PLY codec for 3D Gaussian Splatting point clouds.
//!
//! - Parses the PLY header (ascii, binary_little_endian, binary_big_endian).
//! - Decodes the `vertex` element into per-property `f32` columns.
//! - Resolves the fixed 3DGS attribute schema on top of those columns
//!   (see [`GaussianLayout`]).
//! - Writes vertex-only PLY files with `float` properties.
//!
//! File layout handled here:
//!   ply
//!   format <ascii|binary_little_endian|binary_big_endian> 1.0
//!   comment ...                                   (any number, ignored)
//!   element <name> <count>
//!   property <scalar type> <name>
//!   property list <count type> <item type> <name>
//!   ...
//!   end_header
//!   <body: elements in declaration order, rows of properties in order>
//!
//! Only the `vertex` element is decoded. Elements declared before it are
//! skipped row by row (list properties included); anything after it is
//! never touched.

mod layout;

pub use layout::{expected_rest_count, sh_dim, GaussianLayout};

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub const PLY_MAGIC: &[u8] = b"ply";
pub const VERTEX_ELEMENT: &str = "vertex";

#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed PLY header at line {line}: {reason}")]
    Header { line: usize, reason: String },

    #[error("PLY body truncated in element '{element}' at row {row}")]
    Truncated { element: String, row: usize },

    #[error("invalid value for property '{property}' in element '{element}' at row {row}")]
    InvalidValue {
        element: String,
        property: String,
        row: usize,
    },

    #[error("PLY file has no '{0}' element")]
    MissingElement(String),

    #[error("required vertex property '{0}' is missing")]
    MissingProperty(String),

    #[error("expected {expected} '{prefix}*' properties, found {found}")]
    PropertyCount {
        prefix: String,
        expected: usize,
        found: usize,
    },

    #[error("property '{0}' does not end in a unique integer suffix")]
    BadSuffix(String),

    #[error("column '{name}' has {found} values, expected {expected}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl Encoding {
    fn from_header(token: &str) -> Option<Self> {
        match token {
            "ascii" => Some(Self::Ascii),
            "binary_little_endian" => Some(Self::BinaryLittleEndian),
            "binary_big_endian" => Some(Self::BinaryBigEndian),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Encoding::Ascii => "ascii",
            Encoding::BinaryLittleEndian => "binary_little_endian",
            Encoding::BinaryBigEndian => "binary_big_endian",
        };

        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    /// Accepts both the classic (`uchar`) and the sized (`uint8`) spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(Self::I8),
            "uchar" | "uint8" => Some(Self::U8),
            "short" | "int16" => Some(Self::I16),
            "ushort" | "uint16" => Some(Self::U16),
            "int" | "int32" => Some(Self::I32),
            "uint" | "uint32" => Some(Self::U32),
            "float" | "float32" => Some(Self::F32),
            "double" | "float64" => Some(Self::F64),
            _ => None,
        }
    }

    #[inline]
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    List { count: ScalarType, item: ScalarType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyProperty {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyElement {
    pub name: String,
    pub count: usize,
    pub properties: Vec<PlyProperty>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub encoding: Encoding,
    pub elements: Vec<PlyElement>,
    pub comments: Vec<String>,
}

impl PlyHeader {
    pub fn element(&self, name: &str) -> Option<&PlyElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// The decoded `vertex` element: one `f32` column per scalar property, in
/// header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexTable {
    names: Vec<String>,
    count: usize,
    columns: Vec<Vec<f32>>,
}

impl VertexTable {
    /// Builds a table from named columns; every column must have the same length.
    pub fn new(names: Vec<String>, columns: Vec<Vec<f32>>) -> Result<Self, PlyError> {
        if names.len() != columns.len() {
            return Err(PlyError::ShapeMismatch {
                name: "<columns>".to_owned(),
                expected: names.len(),
                found: columns.len(),
            });
        }

        let count = columns.first().map_or(0, Vec::len);
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != count {
                return Err(PlyError::ShapeMismatch {
                    name: name.clone(),
                    expected: count,
                    found: column.len(),
                });
            }
        }

        Ok(Self {
            names,
            count,
            columns,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f32]> {
        self.index_of(name).map(|i| self.columns[i].as_slice())
    }

    #[inline]
    pub fn column_at(&self, index: usize) -> &[f32] {
        &self.columns[index]
    }
}

#[cold]
fn header_err(line: usize, reason: impl Into<String>) -> PlyError {
    PlyError::Header {
        line,
        reason: reason.into(),
    }
}

/// Parse the header; returns it with the byte offset where the body starts.
pub fn parse_header(bytes: &[u8]) -> Result<(PlyHeader, usize), PlyError> {
    let mut offset = 0usize;
    let mut line_no = 0usize;
    let mut encoding = None;
    let mut elements: Vec<PlyElement> = Vec::new();
    let mut comments = Vec::new();

    loop {
        let rest = &bytes[offset..];
        let Some(end) = rest.iter().position(|&b| b == b'\n') else {
            return Err(header_err(line_no + 1, "missing end_header"));
        };
        line_no += 1;
        offset += end + 1;

        let raw = rest[..end].strip_suffix(b"\r").unwrap_or(&rest[..end]);
        let line = std::str::from_utf8(raw).map_err(|_| header_err(line_no, "not UTF-8"))?;
        let line = line.trim();

        if line_no == 1 {
            if line.as_bytes() != PLY_MAGIC {
                return Err(header_err(line_no, "bad PLY magic"));
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            None => continue,
            Some("format") => {
                let token = tokens.next().unwrap_or_default();
                encoding = Some(
                    Encoding::from_header(token)
                        .ok_or_else(|| header_err(line_no, format!("unknown format '{token}'")))?,
                );
            }
            Some("comment") | Some("obj_info") => {
                let text = line.split_once(char::is_whitespace).map_or("", |(_, t)| t);
                comments.push(text.trim().to_owned());
            }
            Some("element") => {
                let (Some(name), Some(count)) = (tokens.next(), tokens.next()) else {
                    return Err(header_err(line_no, "element needs a name and a count"));
                };
                let count = count
                    .parse::<usize>()
                    .map_err(|_| header_err(line_no, format!("bad element count '{count}'")))?;
                elements.push(PlyElement {
                    name: name.to_owned(),
                    count,
                    properties: Vec::new(),
                });
            }
            Some("property") => {
                let property = parse_property(&mut tokens, line_no)?;
                let element = elements
                    .last_mut()
                    .ok_or_else(|| header_err(line_no, "property before any element"))?;
                element.properties.push(property);
            }
            Some("end_header") => break,
            Some(other) => {
                return Err(header_err(line_no, format!("unknown keyword '{other}'")));
            }
        }
    }

    let encoding = encoding.ok_or_else(|| header_err(line_no, "missing format line"))?;

    Ok((
        PlyHeader {
            encoding,
            elements,
            comments,
        },
        offset,
    ))
}

fn parse_property<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<PlyProperty, PlyError> {
    let scalar = |name: Option<&str>| {
        let name = name.unwrap_or_default();
        ScalarType::from_name(name)
            .ok_or_else(|| header_err(line_no, format!("unknown scalar type '{name}'")))
    };

    let kind = match tokens.next() {
        Some("list") => {
            let count = scalar(tokens.next())?;
            let item = scalar(tokens.next())?;
            PropertyKind::List { count, item }
        }
        ty => PropertyKind::Scalar(scalar(ty)?),
    };

    let name = tokens
        .next()
        .ok_or_else(|| header_err(line_no, "property without a name"))?;

    Ok(PlyProperty {
        name: name.to_owned(),
        kind,
    })
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if buf.len() < n {
        return None;
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Some(head)
}

fn read_scalar(buf: &mut &[u8], ty: ScalarType, big_endian: bool) -> Option<f64> {
    macro_rules! num {
        ($t:ty, $n:expr) => {{
            let mut b = [0u8; $n];
            b.copy_from_slice(take(buf, $n)?);
            if big_endian {
                <$t>::from_be_bytes(b) as f64
            } else {
                <$t>::from_le_bytes(b) as f64
            }
        }};
    }

    Some(match ty {
        ScalarType::I8 => num!(i8, 1),
        ScalarType::U8 => num!(u8, 1),
        ScalarType::I16 => num!(i16, 2),
        ScalarType::U16 => num!(u16, 2),
        ScalarType::I32 => num!(i32, 4),
        ScalarType::U32 => num!(u32, 4),
        ScalarType::F32 => num!(f32, 4),
        ScalarType::F64 => num!(f64, 8),
    })
}

fn list_len(value: f64) -> Option<usize> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
}

/// Parse a whole PLY file from memory and return its `vertex` element.
pub fn parse_ply_bytes(bytes: &[u8]) -> Result<VertexTable, PlyError> {
    let (header, offset) = parse_header(bytes)?;
    if header.element(VERTEX_ELEMENT).is_none() {
        return Err(PlyError::MissingElement(VERTEX_ELEMENT.to_owned()));
    }

    let body = &bytes[offset..];
    match header.encoding {
        Encoding::Ascii => decode_ascii(&header, body),
        Encoding::BinaryLittleEndian => decode_binary(&header, body, false),
        Encoding::BinaryBigEndian => decode_binary(&header, body, true),
    }
}

/// Allocates one column per scalar vertex property; lists get no column.
fn vertex_columns(element: &PlyElement, capacity: usize) -> (Vec<String>, Vec<Vec<f32>>) {
    element
        .properties
        .iter()
        .filter(|p| matches!(p.kind, PropertyKind::Scalar(_)))
        .map(|p| (p.name.clone(), Vec::with_capacity(capacity)))
        .unzip()
}

fn decode_binary(header: &PlyHeader, body: &[u8], big_endian: bool) -> Result<VertexTable, PlyError> {
    let mut p = body;

    for element in &header.elements {
        let truncated = |row| PlyError::Truncated {
            element: element.name.clone(),
            row,
        };
        let is_vertex = element.name == VERTEX_ELEMENT;

        // A declared count can exceed what the body holds; never pre-allocate past it.
        let (names, mut columns) = if is_vertex {
            vertex_columns(element, element.count.min(body.len()))
        } else {
            (Vec::new(), Vec::new())
        };

        for row in 0..element.count {
            let mut col = 0usize;
            for property in &element.properties {
                match property.kind {
                    PropertyKind::Scalar(ty) => {
                        if is_vertex {
                            let v = read_scalar(&mut p, ty, big_endian).ok_or_else(|| truncated(row))?;
                            columns[col].push(v as f32);
                            col += 1;
                        } else {
                            take(&mut p, ty.size()).ok_or_else(|| truncated(row))?;
                        }
                    }
                    PropertyKind::List { count, item } => {
                        let n = read_scalar(&mut p, count, big_endian).ok_or_else(|| truncated(row))?;
                        let n = list_len(n).ok_or_else(|| PlyError::InvalidValue {
                            element: element.name.clone(),
                            property: property.name.clone(),
                            row,
                        })?;
                        let bytes = n.checked_mul(item.size()).ok_or_else(|| truncated(row))?;
                        take(&mut p, bytes).ok_or_else(|| truncated(row))?;
                    }
                }
            }
        }

        if is_vertex {
            return VertexTable::new(names, columns);
        }
    }

    Err(PlyError::MissingElement(VERTEX_ELEMENT.to_owned()))
}

fn decode_ascii(header: &PlyHeader, body: &[u8]) -> Result<VertexTable, PlyError> {
    let text = String::from_utf8_lossy(body);
    let mut tokens = text.split_ascii_whitespace();

    for element in &header.elements {
        let is_vertex = element.name == VERTEX_ELEMENT;
        let (names, mut columns) = if is_vertex {
            vertex_columns(element, element.count.min(body.len()))
        } else {
            (Vec::new(), Vec::new())
        };

        for row in 0..element.count {
            let mut col = 0usize;
            for property in &element.properties {
                let invalid = || PlyError::InvalidValue {
                    element: element.name.clone(),
                    property: property.name.clone(),
                    row,
                };
                let mut next = || {
                    tokens.next().ok_or_else(|| PlyError::Truncated {
                        element: element.name.clone(),
                        row,
                    })
                };

                match property.kind {
                    PropertyKind::Scalar(_) => {
                        let token = next()?;
                        if is_vertex {
                            let v = token.parse::<f32>().map_err(|_| invalid())?;
                            columns[col].push(v);
                            col += 1;
                        }
                    }
                    PropertyKind::List { .. } => {
                        let n = next()?
                            .parse::<f64>()
                            .ok()
                            .and_then(list_len)
                            .ok_or_else(invalid)?;
                        for _ in 0..n {
                            next()?;
                        }
                    }
                }
            }
        }

        if is_vertex {
            return VertexTable::new(names, columns);
        }
    }

    Err(PlyError::MissingElement(VERTEX_ELEMENT.to_owned()))
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<VertexTable, PlyError> {
    let file = File::open(path)?;
    // Safety: the map is read-only and dropped before this function returns.
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_ply_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<VertexTable, PlyError> {
    let bytes = std::fs::read(path)?;
    parse_ply_bytes(&bytes)
}

/// Serialise a vertex table as a vertex-only PLY with `float` properties.
pub fn write_ply_bytes(table: &VertexTable, encoding: Encoding) -> Vec<u8> {
    let row_bytes = table.names.len() * 4;
    let mut out = Vec::<u8>::with_capacity(256 + table.names.len() * 24 + table.count * row_bytes);

    out.extend_from_slice(b"ply\n");
    out.extend_from_slice(format!("format {encoding} 1.0\n").as_bytes());
    out.extend_from_slice(b"comment written by splat_ply\n");
    out.extend_from_slice(format!("element {VERTEX_ELEMENT} {}\n", table.count).as_bytes());
    for name in &table.names {
        out.extend_from_slice(format!("property float {name}\n").as_bytes());
    }
    out.extend_from_slice(b"end_header\n");

    for row in 0..table.count {
        match encoding {
            Encoding::Ascii => {
                let line = table
                    .columns
                    .iter()
                    .map(|c| c[row].to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.extend_from_slice(line.as_bytes());
                out.push(b'\n');
            }
            Encoding::BinaryLittleEndian => {
                for column in &table.columns {
                    out.extend_from_slice(&column[row].to_le_bytes());
                }
            }
            Encoding::BinaryBigEndian => {
                for column in &table.columns {
                    out.extend_from_slice(&column[row].to_be_bytes());
                }
            }
        }
    }

    out
}

pub fn write_file<P: AsRef<Path>>(path: P, table: &VertexTable, encoding: Encoding) -> Result<(), PlyError> {
    let mut file = File::create(path)?;
    file.write_all(&write_ply_bytes(table, encoding))?;
    file.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str], rows: &[&[f32]]) -> VertexTable {
        let columns = (0..names.len())
            .map(|c| rows.iter().map(|r| r[c]).collect())
            .collect();
        VertexTable::new(names.iter().map(|s| s.to_string()).collect(), columns).unwrap()
    }

    #[test]
    fn header_with_crlf_and_comments() {
        let src = b"ply\r\nformat ascii 1.0\r\ncomment made by hand\r\nelement vertex 2\r\n\
                    property float x\r\nproperty uchar red\r\nend_header\r\n1.5 7\n-2 9\n";
        let (header, offset) = parse_header(src).unwrap();

        assert_eq!(header.encoding, Encoding::Ascii);
        assert_eq!(header.comments, vec!["made by hand".to_string()]);
        let vertex = header.element("vertex").unwrap();
        assert_eq!(vertex.count, 2);
        assert_eq!(vertex.properties[1].kind, PropertyKind::Scalar(ScalarType::U8));
        assert_eq!(&src[offset..offset + 3], b"1.5");

        let t = parse_ply_bytes(src).unwrap();
        assert_eq!(t.column("x").unwrap(), &[1.5, -2.0]);
        assert_eq!(t.column("red").unwrap(), &[7.0, 9.0]);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(parse_header(b"plx\nend_header\n"), Err(PlyError::Header { line: 1, .. })));
        assert!(matches!(
            parse_header(b"ply\nformat binary_middle_endian 1.0\nend_header\n"),
            Err(PlyError::Header { line: 2, .. })
        ));
        assert!(matches!(
            parse_header(b"ply\nformat ascii 1.0\nelement vertex 1\nproperty half x\nend_header\n"),
            Err(PlyError::Header { line: 4, .. })
        ));
        assert!(matches!(
            parse_header(b"ply\nformat ascii 1.0\nelement vertex 1\n"),
            Err(PlyError::Header { .. })
        ));
    }

    #[test]
    fn binary_encodings_decode_identically() {
        let t = table(&["x", "y", "opacity"], &[&[0.25, -1.0, 3.5], &[1e-3, 2.0, -7.25]]);

        for encoding in [Encoding::Ascii, Encoding::BinaryLittleEndian, Encoding::BinaryBigEndian] {
            let bytes = write_ply_bytes(&t, encoding);
            let back = parse_ply_bytes(&bytes).unwrap();
            assert_eq!(back, t, "{encoding}");
        }
    }

    #[test]
    fn mixed_scalar_types_and_leading_elements_are_skipped() {
        let mut src = b"ply\nformat binary_little_endian 1.0\n\
                        element camera 1\nproperty list uchar int ids\nproperty double fov\n\
                        element vertex 1\nproperty short a\nproperty list uchar float skip\nproperty double b\n\
                        element face 5\nproperty list uchar int vertex_indices\nend_header\n"
            .to_vec();
        // camera row: list of 2 ints, then a double
        src.push(2);
        src.extend_from_slice(&10i32.to_le_bytes());
        src.extend_from_slice(&11i32.to_le_bytes());
        src.extend_from_slice(&0.5f64.to_le_bytes());
        // vertex row: short, list of 1 float, double
        src.extend_from_slice(&(-3i16).to_le_bytes());
        src.push(1);
        src.extend_from_slice(&9.0f32.to_le_bytes());
        src.extend_from_slice(&2.5f64.to_le_bytes());
        // face element deliberately missing; it is never read

        let t = parse_ply_bytes(&src).unwrap();
        assert_eq!(t.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(t.column("a").unwrap(), &[-3.0]);
        assert_eq!(t.column("b").unwrap(), &[2.5]);
    }

    #[test]
    fn short_body_is_truncated() {
        let t = table(&["x", "y"], &[&[1.0, 2.0], &[3.0, 4.0]]);
        let mut bytes = write_ply_bytes(&t, Encoding::BinaryLittleEndian);
        bytes.truncate(bytes.len() - 2);

        match parse_ply_bytes(&bytes) {
            Err(PlyError::Truncated { element, row }) => {
                assert_eq!(element, "vertex");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ascii_garbage_is_invalid_value() {
        let src = b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nend_header\nnope\n";
        assert!(matches!(parse_ply_bytes(src), Err(PlyError::InvalidValue { row: 0, .. })));
    }

    #[test]
    fn missing_vertex_element() {
        let src = b"ply\nformat ascii 1.0\nelement face 0\nproperty list uchar int idx\nend_header\n";
        assert!(matches!(parse_ply_bytes(src), Err(PlyError::MissingElement(_))));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = VertexTable::new(
            vec!["x".into(), "y".into()],
            vec![vec![1.0, 2.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, PlyError::ShapeMismatch { found: 1, expected: 2, .. }));
    }
}
