use splat_ply::{read_file, write_file, Encoding, GaussianLayout, PlyError, VertexTable};
use tempfile::{tempdir, NamedTempFile};

/// Degree-1 3DGS table with `n` rows. Property order is deliberately
/// shuffled so lookups cannot rely on position.
fn gaussian_table(n: usize) -> VertexTable {
    let mut names: Vec<String> = (0..4).rev().map(|i| format!("rot_{i}")).collect();
    names.extend(["x", "y", "z", "opacity"].map(String::from));
    names.extend((0..9).map(|i| format!("f_rest_{i}")));
    names.extend(["f_dc_0", "f_dc_1", "f_dc_2"].map(String::from));
    names.extend((0..3).map(|i| format!("scale_{i}")));

    let columns = (0..names.len())
        .map(|c| (0..n).map(|r| (c * 100 + r) as f32 * 0.5).collect())
        .collect();
    VertexTable::new(names, columns).unwrap()
}

#[test]
fn file_round_trip_all_encodings() {
    let table = gaussian_table(5);

    for encoding in [Encoding::Ascii, Encoding::BinaryLittleEndian, Encoding::BinaryBigEndian] {
        let file = NamedTempFile::new().unwrap();
        write_file(file.path(), &table, encoding).unwrap();
        let back = read_file(file.path()).unwrap();

        assert_eq!(back.len(), 5);
        assert_eq!(back.names(), table.names());
        for name in table.names() {
            assert_eq!(back.column(name), table.column(name), "{encoding}: {name}");
        }
    }
}

#[test]
fn layout_resolves_shuffled_properties() {
    let table = gaussian_table(2);
    let layout = GaussianLayout::resolve(&table, 1).unwrap();

    assert_eq!(layout.sh_dim(), 12);
    assert_eq!(layout.rest_per_channel(), 3);
    assert_eq!(table.names()[layout.rotation[0]], "rot_0");
    assert_eq!(table.names()[layout.rotation[3]], "rot_3");
    assert_eq!(table.names()[layout.position[2]], "z");
    for (k, &col) in layout.f_rest.iter().enumerate() {
        assert_eq!(table.names()[col], format!("f_rest_{k}"));
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = read_file(dir.path().join("does_not_exist.ply")).unwrap_err();
    assert!(matches!(err, PlyError::Io(_)));
}

#[test]
fn truncated_file_is_rejected() {
    let table = gaussian_table(3);
    let file = NamedTempFile::new().unwrap();
    write_file(file.path(), &table, Encoding::BinaryLittleEndian).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    std::fs::write(file.path(), &bytes[..bytes.len() - 7]).unwrap();
    let err = read_file(file.path()).unwrap_err();

    assert!(matches!(err, PlyError::Truncated { row: 2, .. }));
}
