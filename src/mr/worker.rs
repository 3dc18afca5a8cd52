//! Worker side: ask the coordinator for a task, run it, report it, repeat.
//!
//! Map output is hash partitioned into one intermediate file per reduce
//! bucket. A Reduce task finds its inputs purely by file name, so it does not
//! matter which worker, or how many attempts, produced them.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, info, warn};

use super::codec::{self, IntermediateWriter, KeyValue};
use super::config::WorkerConfig;
use super::error::WorkerError;
use super::partition::bucket_for;
use super::rpc::{self, Empty, ReportTaskRequest};
use super::task::{Assignment, TaskPhase};
use crate::mrapps::{App, MapFn, ReduceFn};

/// Runs tasks until the coordinator says the job is over or stops answering.
///
/// A failure to run a task ends the worker with an error. The coordinator
/// hands that task to someone else once it times out.
pub async fn start_worker(config: &WorkerConfig, app: App) -> Result<(), WorkerError> {
    let mut client = rpc::connect(&config.endpoint).await?;
    info!("worker connected to coordinator at {}", config.endpoint);

    loop {
        let reply = match client.get_task(Empty {}).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                warn!("coordinator unreachable ({}), shutting down", status.message());
                return Ok(());
            }
        };

        let (phase, index, attempt) = match Assignment::try_from(reply)? {
            Assignment::Map {
                file,
                index,
                n_reduce,
                attempt,
            } => {
                info!("running map task {} on {}", index, file);
                let work_dir = config.work_dir.clone();
                tokio::task::spawn_blocking(move || {
                    execute_map(&work_dir, &file, index, n_reduce, app.map)
                })
                .await??;
                (TaskPhase::Map, index, attempt)
            }
            Assignment::Reduce {
                index,
                n_map,
                attempt,
                ..
            } => {
                info!("running reduce task {}", index);
                let work_dir = config.work_dir.clone();
                tokio::task::spawn_blocking(move || {
                    execute_reduce(&work_dir, index, n_map, app.reduce)
                })
                .await??;
                (TaskPhase::Reduce, index, attempt)
            }
            Assignment::Wait => {
                debug!("nothing to do, waiting {:?}", config.wait_interval);
                tokio::time::sleep(config.wait_interval).await;
                continue;
            }
            Assignment::Exit => {
                info!("job finished, worker exiting");
                return Ok(());
            }
        };

        // the coordinator silently drops this if the task was already
        // handed to someone else
        let request = ReportTaskRequest::new(phase, index, attempt);
        if let Err(status) = client.report_task(request).await {
            warn!("coordinator unreachable ({}), shutting down", status.message());
            return Ok(());
        }
        debug!("reported {:?} task {} attempt {}", phase, index, attempt);
    }
}

/// Runs Map task `map_index` over `file`, leaving one intermediate file per
/// bucket in `work_dir`, empty ones included. Returns the committed paths.
pub fn execute_map(
    work_dir: &Path,
    file: &str,
    map_index: u32,
    n_reduce: u32,
    mapf: MapFn,
) -> Result<Vec<PathBuf>, WorkerError> {
    let contents = fs::read_to_string(file).map_err(|source| WorkerError::Input {
        path: PathBuf::from(file),
        source,
    })?;
    let intermediate = mapf(file, &contents);

    let mut writers = (0..n_reduce)
        .map(|bucket| IntermediateWriter::create(work_dir, map_index, bucket))
        .collect::<Result<Vec<_>, _>>()?;
    for kv in &intermediate {
        writers[bucket_for(&kv.key, n_reduce) as usize].append(kv)?;
    }
    debug!(
        "map task {} emitted {} records into {} buckets",
        map_index,
        intermediate.len(),
        n_reduce
    );

    // nothing becomes visible until every record has been routed
    writers.into_iter().map(IntermediateWriter::commit).collect()
}

/// Intermediate files addressed to `bucket`, keyed by producing map task.
fn find_intermediate(work_dir: &Path, bucket: u32) -> Result<Vec<(u32, PathBuf)>, WorkerError> {
    let dir = glob::Pattern::escape(&work_dir.to_string_lossy());
    let pattern = Path::new(&dir).join(format!("mr-*-{}", bucket));

    let mut found = vec![];
    for entry in glob(&pattern.to_string_lossy())? {
        let path = entry.map_err(std::io::Error::from)?;
        let parsed = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(codec::parse_intermediate_name);
        // `mr-out-<bucket>` matches the pattern too
        if let Some((map_index, b)) = parsed {
            if b == bucket {
                found.push((map_index, path));
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Runs Reduce task `bucket`, merging the output of map tasks `0..n_map`.
pub fn execute_reduce(
    work_dir: &Path,
    bucket: u32,
    n_map: u32,
    reducef: ReduceFn,
) -> Result<PathBuf, WorkerError> {
    let inputs = find_intermediate(work_dir, bucket)?
        .into_iter()
        .filter(|(map_index, _)| *map_index < n_map)
        .collect::<Vec<_>>();

    let missing = (0..n_map)
        .filter(|m| !inputs.iter().any(|(map_index, _)| map_index == m))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(WorkerError::MissingIntermediate { bucket, missing });
    }

    let mut intermediate = vec![];
    for (_, path) in &inputs {
        intermediate.extend(codec::read_intermediate(path)?);
    }
    intermediate.sort_by(|a, b| a.key.cmp(&b.key));

    let results = collapse(&intermediate, reducef);
    debug!(
        "reduce task {} folded {} records into {} keys",
        bucket,
        intermediate.len(),
        results.len()
    );
    codec::write_output(
        work_dir,
        bucket,
        results.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )
}

/// Applies `reducef` to every run of equal keys in `intermediate`, which must
/// be sorted by key. Results come out in key order.
pub fn collapse(intermediate: &[KeyValue], reducef: ReduceFn) -> Vec<(String, String)> {
    let mut results = vec![];
    let mut i = 0;
    while i < intermediate.len() {
        let key = &intermediate[i].key;
        let count = intermediate[i..]
            .iter()
            .take_while(|kv| &kv.key == key)
            .count();
        let values = intermediate[i..i + count]
            .iter()
            .map(|kv| kv.value.clone())
            .collect::<Vec<_>>();
        results.push((key.clone(), reducef(key, &values)));
        i += count;
    }
    results
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mrapps::wc;

    fn sum(_key: &str, values: &[String]) -> String {
        values
            .iter()
            .map(|v| v.parse::<u64>().unwrap())
            .sum::<u64>()
            .to_string()
    }

    fn write_input(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn read_outputs(dir: &Path, n_reduce: u32) -> Vec<String> {
        let mut lines = vec![];
        for bucket in 0..n_reduce {
            let path = dir.join(codec::output_name(bucket));
            if let Ok(contents) = fs::read_to_string(path) {
                lines.extend(contents.lines().map(str::to_owned));
            }
        }
        lines.sort();
        lines
    }

    #[test]
    fn test_collapse_groups_runs() {
        let intermediate = vec![
            KeyValue::new("a", "1"),
            KeyValue::new("a", "2"),
            KeyValue::new("b", "5"),
            KeyValue::new("c", "1"),
            KeyValue::new("c", "1"),
        ];
        assert_eq!(
            collapse(&intermediate, sum),
            vec![
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "5".to_string()),
                ("c".to_string(), "2".to_string()),
            ]
        );
        assert!(collapse(&[], sum).is_empty());
    }

    #[test]
    fn test_map_partitions_every_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "a.txt", "x y x");

        let paths = execute_map(dir.path(), &input, 0, 3, wc::map).unwrap();
        assert_eq!(paths.len(), 3);

        let mut total = 0;
        for (bucket, path) in paths.iter().enumerate() {
            assert_eq!(path, &dir.path().join(format!("mr-0-{}", bucket)));
            let records = codec::read_intermediate(path).unwrap();
            for kv in &records {
                assert_eq!(bucket_for(&kv.key, 3), bucket as u32);
            }
            total += records.len();
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn test_map_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = execute_map(dir.path(), &missing.to_string_lossy(), 0, 2, wc::map);
        assert!(matches!(err, Err(WorkerError::Input { .. })));
        assert!(!dir.path().join("mr-0-0").exists());
    }

    #[test]
    fn test_word_count_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "x y x");
        let b = write_input(dir.path(), "b.txt", "y x");

        execute_map(dir.path(), &a, 0, 2, wc::map).unwrap();
        execute_map(dir.path(), &b, 1, 2, wc::map).unwrap();
        for bucket in 0..2 {
            execute_reduce(dir.path(), bucket, 2, sum).unwrap();
        }

        assert_eq!(read_outputs(dir.path(), 2), vec!["x 3", "y 2"]);
    }

    #[test]
    fn test_reexecuted_tasks_do_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "x y x");

        execute_map(dir.path(), &a, 0, 1, wc::map).unwrap();
        execute_reduce(dir.path(), 0, 1, wc::reduce).unwrap();
        // a second attempt of both tasks, e.g. after a false timeout
        execute_map(dir.path(), &a, 0, 1, wc::map).unwrap();
        execute_reduce(dir.path(), 0, 1, wc::reduce).unwrap();

        assert_eq!(read_outputs(dir.path(), 1), vec!["x 2", "y 1"]);
    }

    #[test]
    fn test_reduce_reports_missing_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "x");
        execute_map(dir.path(), &a, 1, 1, wc::map).unwrap();

        match execute_reduce(dir.path(), 0, 3, wc::reduce) {
            Err(WorkerError::MissingIntermediate { bucket, missing }) => {
                assert_eq!(bucket, 0);
                assert_eq!(missing, vec![0, 2]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!dir.path().join("mr-out-0").exists());
    }

    #[test]
    fn test_reduce_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "a.txt", "x x");
        execute_map(dir.path(), &a, 0, 1, wc::map).unwrap();
        fs::write(dir.path().join("mr-out-0"), "stale output\n").unwrap();
        // from a map task outside this job
        fs::write(dir.path().join("mr-9-0"), "garbage\n").unwrap();

        execute_reduce(dir.path(), 0, 1, wc::reduce).unwrap();
        assert_eq!(read_outputs(dir.path(), 1), vec!["x 2"]);
    }

    #[test]
    fn test_reduce_with_no_map_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = execute_reduce(dir.path(), 0, 0, wc::reduce).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
