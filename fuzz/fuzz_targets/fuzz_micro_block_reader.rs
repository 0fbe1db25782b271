#![no_main]

use libfuzzer_sys::arbitrary;
use libfuzzer_sys::fuzz_target;
use rowlite::block::{MicroBlockData, MicroBlockReader, MicroBlockWriter};
use rowlite::column_map::{ColumnDesc, ColumnMap};
use rowlite::types::{ColumnType, Datum, RowKey, StoreRow};

#[derive(arbitrary::Arbitrary, Debug)]
enum BlockInput {
    /// Arbitrary bytes must be rejected or decoded, never panic.
    Raw {
        data: Vec<u8>,
        positions: Vec<u16>,
        needles: Vec<i64>,
    },
    Rows {
        keys: Vec<i64>,
        values: Vec<Option<String>>,
        needles: Vec<i64>,
    },
}

fn column_map() -> ColumnMap {
    ColumnMap::full(
        1,
        1,
        vec![
            ColumnDesc::new(1, ColumnType::Int),
            ColumnDesc::new(2, ColumnType::Varchar),
        ],
    )
    .unwrap()
}

fn int_key(k: i64) -> RowKey<'static> {
    RowKey::new(vec![Datum::Int(k)])
}

fuzz_target!(|input: BlockInput| {
    let map = column_map();
    let mut row = StoreRow::new(map.out_count());

    use BlockInput::*;
    match input {
        Raw {
            data,
            positions,
            needles,
        } => {
            let mut reader = MicroBlockReader::new();
            if reader.init(MicroBlockData::new(&data), &map).is_err() {
                return;
            }
            let end = reader.end().unwrap();
            for pos in positions {
                let _ = reader.get_row(pos as usize, &mut row);
            }
            for needle in needles {
                let _ = reader.find_bound(&int_key(needle), true, 0, end);
            }
        }
        Rows {
            mut keys,
            values,
            needles,
        } => {
            keys.sort_unstable();
            keys.dedup();
            let mut writer = MicroBlockWriter::new(&map, 1 << 20).unwrap();
            for (i, k) in keys.iter().enumerate() {
                let value = match values.get(i) {
                    Some(Some(s)) => Datum::from(s.as_str()),
                    _ => Datum::Null,
                };
                let row = StoreRow::from_cells(vec![Datum::Int(*k), value]);
                if writer.append_row(&row).is_err() {
                    return;
                }
            }
            let block = match writer.build() {
                Ok(block) => block,
                Err(_) => return,
            };

            let mut reader = MicroBlockReader::new();
            reader.init(MicroBlockData::new(&block), &map).unwrap();
            let end = reader.end().unwrap();
            assert_eq!(end, keys.len());
            for (pos, k) in keys.iter().enumerate() {
                reader.get_row(pos, &mut row).unwrap();
                assert_eq!(row.cells[0], Datum::Int(*k));
            }
            for needle in needles {
                let lower = keys.partition_point(|k| *k < needle);
                let upper = keys.partition_point(|k| *k <= needle);
                let (pos, is_equal) = reader.find_bound(&int_key(needle), true, 0, end).unwrap();
                assert_eq!((pos, is_equal), (lower, lower != upper));
                assert_eq!(
                    reader.find_bound(&int_key(needle), false, 0, end).unwrap(),
                    (upper, false)
                );
            }
        }
    }
});
