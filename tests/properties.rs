use std::io::Write;

use logsift::cluster::{normalize_message, run_cluster};
use logsift::config::{ClusterConfig, FilterConfig, IndexConfig};
use logsift::filter::run_filter;
use logsift::index::{build_index, detect_level, parse_timestamp_prefix, strip_timestamp};
use logsift::{
    CancelToken, ClusterOptions, FilterPredicate, Level, LineIndex, MappedLogFile, Outcome,
    TextQuery,
};
use proptest::prelude::*;
use tempfile::NamedTempFile;

fn create_test_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content).expect("write contents");
    file.flush().expect("flush contents");
    file
}

fn index_with_chunk(file: &NamedTempFile, chunk_size: usize) -> LineIndex {
    let config = IndexConfig {
        chunk_size,
        ..IndexConfig::default()
    };
    match build_index(file.path(), &config, &CancelToken::new(), &mut |_| {}).unwrap() {
        Outcome::Completed(index) => index,
        Outcome::Cancelled(_) => panic!("indexing was not cancelled"),
    }
}

fn filter(index: &LineIndex, file: &MappedLogFile, predicate: &FilterPredicate) -> Vec<u64> {
    let compiled = predicate.compile().unwrap();
    run_filter(
        index,
        file,
        &compiled,
        &FilterConfig::default(),
        &CancelToken::new(),
        &mut |_| {},
    )
    .into_inner()
}

/// Level and minute key recomputed from the row's own text
fn reparse(file: &MappedLogFile, index: &LineIndex, row: u64) -> (Option<Level>, Option<u64>) {
    let line = file.read_line_at(index.offset_of(row).unwrap(), 1 << 16);
    let minute = parse_timestamp_prefix(&line).map(|keys| keys.minute_key);
    (detect_level(&line), minute)
}

fn raw_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        prop::sample::select(vec![b'a', b'E', b'1', b' ', b'\n', b'\n', b'\r', b':', 0xc3, 0xff]),
        0..400,
    )
}

fn log_line() -> impl Strategy<Value = String> {
    (
        prop::option::of((0u32..24, 0u32..60)),
        prop::sample::select(vec!["", "[INFO] ", "[ERROR] ", "WARN: ", " DEBUG ", "(fatal) "]),
        prop::sample::select(vec![
            "request 17 done",
            "request 9 done",
            "open /var/tmp/a.dat failed",
            "user bob@example.com login",
            "retry 3 of 5",
            "Exception in thread main",
            "",
        ]),
    )
        .prop_map(|(time, level, message)| match time {
            Some((hour, minute)) => {
                format!("2024-03-04 {:02}:{:02}:00 {}{}", hour, minute, level, message)
            }
            None => format!("{}{}", level, message),
        })
}

fn log_content() -> impl Strategy<Value = String> {
    prop::collection::vec(log_line(), 0..40).prop_map(|lines| {
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        content
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn line_count_equals_line_feed_count(content in raw_bytes(), chunk_size in 1usize..64) {
        let file = create_test_file(&content);
        let index = index_with_chunk(&file, chunk_size);

        let line_feeds = content.iter().filter(|&&b| b == b'\n').count() as u64;
        prop_assert_eq!(index.total_lines(), line_feeds);
        prop_assert_eq!(index.offsets().len() as u64, line_feeds + 1);
        prop_assert_eq!(index.level_code_slots().len() as u64, line_feeds + 1);
        prop_assert_eq!(index.minute_key_slots().len() as u64, line_feeds + 1);
        prop_assert_eq!(index.offsets()[0], 0);
        prop_assert!(index.offsets().windows(2).all(|pair| pair[0] < pair[1]));

        for &offset in &index.offsets()[1..] {
            prop_assert_eq!(content[offset as usize - 1], b'\n');
        }
    }

    #[test]
    fn index_is_independent_of_chunking(content in log_content(), chunk_size in 1usize..97) {
        let file = create_test_file(content.as_bytes());
        let whole = index_with_chunk(&file, 1 << 20);
        let chunked = index_with_chunk(&file, chunk_size);
        let again = index_with_chunk(&file, 1 << 20);

        prop_assert_eq!(&whole, &chunked);
        prop_assert_eq!(&whole, &again);
    }

    #[test]
    fn metadata_matches_reparsed_line(content in log_content(), chunk_size in 1usize..97) {
        // Generated lines are ASCII and shorter than the index prefix
        let temp = create_test_file(content.as_bytes());
        let index = index_with_chunk(&temp, chunk_size);
        let file = MappedLogFile::open_path(temp.path()).unwrap();

        for row in index.rows() {
            let (level, minute) = reparse(&file, &index, row);
            prop_assert_eq!(index.level_of(row), level);
            prop_assert_eq!(index.minute_key_of(row), minute);
        }
    }

    #[test]
    fn filter_result_is_ascending_subset(
        content in log_content(),
        levels in prop::collection::btree_set(prop::sample::select(Level::ALL.to_vec()), 0..3),
        bucket_pick in prop::option::of(any::<prop::sample::Index>()),
        needle in prop::sample::select(vec!["", "request", "done", "/var", "7"]),
    ) {
        let temp = create_test_file(content.as_bytes());
        let index = index_with_chunk(&temp, 1 << 20);
        let file = MappedLogFile::open_path(temp.path()).unwrap();

        let all = filter(&index, &file, &FilterPredicate::new());
        prop_assert_eq!(all, index.rows().collect::<Vec<_>>());

        // Pick the bucket from minutes that actually occur in the file
        let minutes: Vec<u64> = index.rows().filter_map(|row| reparse(&file, &index, row).1).collect();
        let bucket = bucket_pick.and_then(|pick| {
            (!minutes.is_empty()).then(|| minutes[pick.index(minutes.len())])
        });

        let mut predicate = FilterPredicate::new()
            .with_levels(levels.iter().copied())
            .with_text(TextQuery::literal(needle));
        if let Some(bucket) = bucket {
            predicate = predicate.with_minute_bucket(bucket);
        }
        let rows = filter(&index, &file, &predicate);

        prop_assert!(rows.windows(2).all(|pair| pair[0] < pair[1]));
        for row in index.rows() {
            let line = file.read_line_at(index.offset_of(row).unwrap(), 1 << 16);
            let (level, minute) = reparse(&file, &index, row);
            let expected = level.map_or(true, |l| levels.is_empty() || levels.contains(&l))
                && bucket.map_or(true, |b| minute == Some(b))
                && line.contains(needle);
            prop_assert_eq!(rows.binary_search(&row).is_ok(), expected, "row {}", row);
        }
    }

    #[test]
    fn clusters_partition_the_view(content in log_content()) {
        let temp = create_test_file(content.as_bytes());
        let index = index_with_chunk(&temp, 1 << 20);
        let file = MappedLogFile::open_path(temp.path()).unwrap();
        let rows: Vec<u64> = index.rows().collect();

        let options = ClusterOptions {
            errors_only: false,
            max_clusters: usize::MAX,
        };
        let clusters = run_cluster(
            &rows,
            &file,
            &index,
            &options,
            &ClusterConfig::default(),
            &CancelToken::new(),
            &mut |_| {},
        )
        .into_inner();

        let expected_keys: Vec<String> = rows
            .iter()
            .map(|&row| {
                let line = file.read_line_at(index.offset_of(row).unwrap(), 1 << 16);
                normalize_message(strip_timestamp(&line).1)
            })
            .filter(|key| !key.is_empty())
            .collect();

        let total: u64 = clusters.iter().map(|c| c.count).sum();
        prop_assert_eq!(total, expected_keys.len() as u64);
        prop_assert!(clusters.windows(2).all(|pair| pair[0].count >= pair[1].count));
        for cluster in &clusters {
            let members = expected_keys.iter().filter(|k| **k == cluster.template_key).count();
            prop_assert_eq!(cluster.count, members as u64);
        }
    }

    #[test]
    fn normalization_is_idempotent(message in "[a-z0-9 ./@:-]{0,32}") {
        let once = normalize_message(&message);
        prop_assert_eq!(normalize_message(&once), once);
    }
}
