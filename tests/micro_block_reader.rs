use rand::seq::SliceRandom;
use rand::Rng;
use rowlite::block::{MicroBlockData, MicroBlockReader, MicroBlockWriter, MAX_BATCH_ROW_COUNT};
use rowlite::column_map::{ColumnDesc, ColumnMap};
use rowlite::error::RowLiteError;
use rowlite::types::{Collation, ColumnType, Datum, RowKey, StoreRow};

fn store_columns() -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::new(16, ColumnType::Int),
        ColumnDesc::new(17, ColumnType::Varchar),
        ColumnDesc::new(18, ColumnType::Double),
        ColumnDesc::new(19, ColumnType::Bool),
        ColumnDesc::new(20, ColumnType::Timestamp),
        ColumnDesc::new(21, ColumnType::UInt),
        ColumnDesc::new(22, ColumnType::Blob),
    ]
}

fn make_row(i: i64) -> StoreRow<'static> {
    StoreRow::from_cells(vec![
        Datum::Int(i),
        Datum::from(format!("row-{:04}", i)),
        if i % 3 == 0 {
            Datum::Null
        } else {
            Datum::Double(i as f64 / 7.0)
        },
        Datum::Bool(i % 2 == 0),
        Datum::Timestamp(1_600_000_000_000_000 + i),
        Datum::UInt(u64::MAX - i as u64),
        Datum::from(vec![i as u8; i.rem_euclid(5) as usize]),
    ])
}

fn build(map: &ColumnMap, keys: &[i64]) -> Vec<u8> {
    let mut writer = MicroBlockWriter::new(map, 1 << 20).unwrap();
    for k in keys {
        writer.append_row(&make_row(*k)).unwrap();
    }
    writer.build().unwrap()
}

fn int_key(k: i64) -> RowKey<'static> {
    RowKey::new(vec![Datum::Int(k)])
}

#[test]
fn test_find_bound_scenario() {
    let map = ColumnMap::full(1, 1, store_columns()).unwrap();
    let block = build(&map, &[2, 4, 6, 8]);
    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();
    let (begin, end) = (reader.begin().unwrap(), reader.end().unwrap());

    assert_eq!(reader.find_bound(&int_key(5), true, begin, end).unwrap(), (2, false));
    assert_eq!(reader.find_bound(&int_key(6), true, begin, end).unwrap(), (2, true));
    assert_eq!(reader.find_bound(&RowKey::Min, true, begin, end).unwrap(), (0, false));
    assert_eq!(reader.find_bound(&int_key(9), true, begin, end).unwrap(), (4, false));
}

#[test]
fn test_get_rows_round_trip() {
    let map = ColumnMap::full(1, 1, store_columns()).unwrap();
    let keys: Vec<i64> = (0..10).collect();
    let block = build(&map, &keys);
    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();

    let mut rows: Vec<StoreRow> = (0..MAX_BATCH_ROW_COUNT)
        .map(|_| StoreRow::new(map.out_count()))
        .collect();
    let mut row_count = 0;
    reader.get_rows(0, 10, &mut rows, &mut row_count).unwrap();
    assert_eq!(row_count, 10);
    for (i, row) in rows.iter().take(row_count).enumerate() {
        assert_eq!(row, &make_row(i as i64));
    }

    // clamped to the block end and the slots available
    reader.get_rows(7, 100, &mut rows, &mut row_count).unwrap();
    assert_eq!(row_count, 3);
    assert_eq!(rows[0], make_row(7));
    reader.get_rows(2, 100, &mut rows[..4], &mut row_count).unwrap();
    assert_eq!(row_count, 4);
    reader.get_rows(10, 1, &mut rows, &mut row_count).unwrap();
    assert_eq!(row_count, 0);
    assert!(matches!(
        reader.get_rows(11, 1, &mut rows, &mut row_count),
        Err(RowLiteError::OutOfRange { .. })
    ));

    let mut row = StoreRow::new(map.out_count());
    assert_eq!(
        reader.get_row(10, &mut row),
        Err(RowLiteError::OutOfRange {
            position: 10,
            begin: 0,
            end: 10
        })
    );
}

#[test]
fn test_insufficient_row_storage() {
    let map = ColumnMap::full(1, 1, store_columns()).unwrap();
    let block = build(&map, &[1, 2, 3]);
    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();

    let mut rows = vec![StoreRow::new(7), StoreRow::new(2), StoreRow::new(7)];
    let mut row_count = 0;
    assert!(matches!(
        reader.get_rows(0, 3, &mut rows, &mut row_count),
        Err(RowLiteError::AllocationFailed(_))
    ));
    assert_eq!(row_count, 1);
    assert_eq!(rows[0], make_row(1));
    assert!(rows[1].cells.is_empty());
}

#[test]
fn test_projection() {
    let out = [
        ColumnDesc::new(22, ColumnType::Blob),
        ColumnDesc::new(99, ColumnType::Varchar),
        ColumnDesc::new(16, ColumnType::Int),
        ColumnDesc::new(17, ColumnType::Varchar),
    ];
    let full = ColumnMap::full(1, 1, store_columns()).unwrap();
    let map = ColumnMap::new(1, 1, store_columns(), &out).unwrap();
    let block = build(&full, &[3, 4]);

    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();
    let mut row = StoreRow::new(map.out_count());
    reader.get_row(1, &mut row).unwrap();
    assert_eq!(
        row.cells,
        vec![
            Datum::from(vec![4u8; 4]),
            Datum::Null,
            Datum::Int(4),
            Datum::from("row-0004"),
        ]
    );
}

#[test]
fn test_random_find_bound() {
    let map = ColumnMap::full(1, 1, store_columns()).unwrap();
    let mut rng = rand::thread_rng();
    let mut keys: Vec<i64> = (0..500).map(|_| rng.gen_range(-1000..1000)).collect();
    keys.sort_unstable();
    keys.dedup();
    let block = build(&map, &keys);

    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();
    let n = reader.end().unwrap();
    assert_eq!(n, keys.len());

    let mut needles: Vec<i64> = (-1100..1100).collect();
    needles.shuffle(&mut rng);
    for needle in needles.into_iter().take(300) {
        let lower = keys.iter().position(|k| *k >= needle).unwrap_or(n);
        let upper = keys.iter().position(|k| *k > needle).unwrap_or(n);
        let exists = keys.binary_search(&needle).is_ok();
        assert_eq!(
            reader.find_bound(&int_key(needle), true, 0, n).unwrap(),
            (lower, exists)
        );
        assert_eq!(
            reader.find_bound(&int_key(needle), false, 0, n).unwrap(),
            (upper, false)
        );
    }
}

#[test]
fn test_composite_key_and_collation() {
    let columns = vec![
        ColumnDesc::new(1, ColumnType::Varchar).with_collation(Collation::Utf8Mb4GeneralCi),
        ColumnDesc::new(2, ColumnType::Int),
        ColumnDesc::new(3, ColumnType::Int),
    ];
    let map = ColumnMap::full(1, 2, columns).unwrap();
    let mut writer = MicroBlockWriter::new(&map, 4096).unwrap();
    for (name, n) in &[("apple", 1), ("apple", 2), ("Banana", 1), ("cherry", 5)] {
        let row = StoreRow::from_cells(vec![Datum::from(*name), Datum::Int(*n), Datum::Int(0)]);
        writer.append_row(&row).unwrap();
    }
    // equal to "Banana" under the collation
    let dup = StoreRow::from_cells(vec![Datum::from("BANANA "), Datum::Int(1), Datum::Int(0)]);
    assert!(writer.append_row(&dup).is_err());
    let block = writer.build().unwrap();

    let mut reader = MicroBlockReader::new();
    reader.init(MicroBlockData::new(&block), &map).unwrap();
    let key = |s: &'static str, n: i64| RowKey::new(vec![Datum::from(s), Datum::Int(n)]);
    assert_eq!(reader.find_bound(&key("BANANA", 1), true, 0, 4).unwrap(), (2, true));
    assert_eq!(reader.find_bound(&key("apple", 3), true, 0, 4).unwrap(), (2, false));
    assert_eq!(reader.find_bound(&key("APPLE", 1), false, 0, 4).unwrap(), (1, false));
    let null_second = RowKey::new(vec![Datum::from("apple"), Datum::Null]);
    assert_eq!(reader.find_bound(&null_second, true, 0, 4).unwrap(), (0, false));

    let short = RowKey::new(vec![Datum::from("apple")]);
    assert!(matches!(
        reader.find_bound(&short, true, 0, 4),
        Err(RowLiteError::InvalidArgument(_))
    ));
}

#[test]
fn test_reader_reuse() {
    let map = ColumnMap::full(1, 1, store_columns()).unwrap();
    let first = build(&map, &[1, 2, 3]);
    let second = build(&map, &[10, 20]);
    let mut reader = MicroBlockReader::new();
    let mut row = StoreRow::new(map.out_count());

    reader.init(MicroBlockData::new(&first), &map).unwrap();
    reader.get_row(2, &mut row).unwrap();
    assert_eq!(row.cells[0], Datum::Int(3));

    reader.reset();
    reader.init(MicroBlockData::new(&second), &map).unwrap();
    assert_eq!(reader.end().unwrap(), 2);
    reader.get_row(1, &mut row).unwrap();
    assert_eq!(row.cells[0], Datum::Int(20));
}
