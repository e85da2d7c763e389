use payload_diagnose::{
    Interpreter, JobDescriptor,
    config::Config,
    metadata::{parse_metadata, total_number_of_events},
    summary::{EventCounts, SummaryFileSet, parse_event_counts, process_summary_files},
};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

fn write_aged(dir: &Path, name: &str, body: &str, age_secs: u64) -> PathBuf {
    write_at(dir, name, body, SystemTime::now() - Duration::from_secs(age_secs))
}

fn write_at(dir: &Path, name: &str, body: &str, t: SystemTime) -> PathBuf {
    let p = write(dir, name, body);
    std::fs::File::options()
        .write(true)
        .open(&p)
        .unwrap()
        .set_modified(t)
        .unwrap();
    p
}

fn counts(dir: &Path) -> (u64, u64) {
    let out = Interpreter::new(&Config::default()).interpret(&JobDescriptor::new(dir));
    (out.result.nevents, out.result.neventsw)
}

const METADATA: &str = r#"<POOLFILECATALOG>
  <File ID="1"><logical><lfn name="a.root"/></logical><metadata att_name="events" att_value="70"/></File>
  <File ID="2"><logical><lfn name="b.root"/></logical><metadata att_name="events" att_value="5"/></File>
</POOLFILECATALOG>"#;

#[test]
fn oldest_is_minimum_timestamp() {
    let tmp = TempDir::new().unwrap();
    let mid = write_aged(tmp.path(), "AthSummary_b.txt", "", 200);
    let old = write_aged(tmp.path(), "AthenaSummary_c.txt", "", 300);
    let new = write_aged(tmp.path(), "AthSummary_a.txt", "", 100);

    let set = SummaryFileSet::partition(&[mid, new.clone(), old.clone()]).unwrap();
    assert_eq!(set.oldest.path, old);
    assert_eq!(set.most_recent.path, new);
    assert!(!set.is_single());
}

#[test]
fn single_summary_file_is_both() {
    let tmp = TempDir::new().unwrap();
    let only = write(tmp.path(), "AthSummary.txt", "Events Read: 3\n");
    let set = SummaryFileSet::partition(std::slice::from_ref(&only)).unwrap();
    assert_eq!(set.oldest, set.most_recent);
    assert!(set.is_single());
    assert!(SummaryFileSet::partition(&[]).is_none());
}

#[test]
fn equal_timestamps_collapse_to_one_file() {
    let tmp = TempDir::new().unwrap();
    let t = SystemTime::now() - Duration::from_secs(60);
    let first = write_at(tmp.path(), "AthSummary_1.txt", "Events Read: 4\n", t);
    let second = write_at(tmp.path(), "AthSummary_2.txt", "Events Read: 5\n", t);

    let set = SummaryFileSet::partition(&[first.clone(), second]).unwrap();
    assert!(set.is_single());
    assert_eq!(set.oldest.path, first);
}

#[test]
fn counts_come_from_oldest_summary_file() {
    let tmp = TempDir::new().unwrap();
    let old = write_aged(
        tmp.path(),
        "AthSummary.txt",
        "Job summary\nEvents Read:  1200\nEvents Written: 1100\n",
        500,
    );
    let new = write_aged(
        tmp.path(),
        "AthenaSummary.txt",
        "Events Read: 7\nEvents Written: 7\n",
        10,
    );
    let c = process_summary_files(&[new, old]).unwrap();
    assert_eq!((c.read, c.written), (1200, 1100));
    assert_eq!(counts(tmp.path()), (1200, 1100));
}

#[test]
fn report_takes_priority_over_other_sources() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "jobReport.json", r#"{"exitCode": 0, "n_events": 42}"#);
    write(tmp.path(), "metadata.xml", METADATA);
    write(tmp.path(), "AthSummary.txt", "Events Read: 9\nEvents Written: 8\n");
    assert_eq!(counts(tmp.path()), (42, 0));
}

#[test]
fn metadata_used_when_report_has_no_count() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "jobReport.json", r#"{"exitCode": 0, "n_events": "many"}"#);
    write(tmp.path(), "metadata.xml", METADATA);
    write(tmp.path(), "AthSummary.txt", "Events Read: 9\nEvents Written: 8\n");
    assert_eq!(counts(tmp.path()), (75, 0));
}

#[test]
fn summary_used_without_report_or_metadata() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "metadata.xml", "<POOLFILECATALOG></POOLFILECATALOG>");
    write(tmp.path(), "AthSummary.txt", "Events Read: 9\nEvents Written: 8\n");
    assert_eq!(counts(tmp.path()), (9, 8));
}

#[test]
fn no_sources_means_unknown() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "AthSummary.txt", "");
    assert_eq!(counts(tmp.path()), (0, 0));
}

#[test]
fn counter_parsing_stops_once_both_found() {
    let c = parse_event_counts("Events Read:  100\nEvents Written: 40\nEvents Read: 999\n").unwrap();
    assert_eq!(c, EventCounts { read: 100, written: 40 });
}

#[test]
fn malformed_or_oversized_counters_are_zero() {
    // the regex is anchored, so an indented line does not count
    let c = parse_event_counts("  Events Read: 100\nEvents Written: lots\n").unwrap();
    assert_eq!(c, EventCounts { read: 0, written: 0 });

    let c = parse_event_counts("Events Read: 99999999999999999999999\n").unwrap();
    assert_eq!(c.read, 0);
}

#[test]
fn metadata_events_summed_over_files() {
    let xml = r#"<?xml version="1.0"?>
<POOLFILECATALOG>
  <File ID="A1">
    <logical><lfn name="out.1.root"/></logical>
    <metadata att_name="events" att_value="120"/>
    <metadata att_name="size" att_value="2048"/>
  </File>
  <File ID="B2">
    <logical><lfn name="out.2.root"/></logical>
    <metadata att_name="events" att_value="30"/>
  </File>
  <File ID="C3">
    <logical><lfn name="out.3.root"/></logical>
    <metadata att_name="events" att_value="n/a"/>
  </File>
</POOLFILECATALOG>"#;
    let md = parse_metadata(xml).unwrap();
    assert_eq!(md.len(), 3);
    assert_eq!(md["out.1.root"]["size"], "2048");
    assert_eq!(total_number_of_events(&md), 150);
}

#[test]
fn metadata_attributes_in_any_order_and_quoting() {
    let xml = r#"<POOLFILECATALOG>
  <File ID='A1'>
    <logical><lfn name='swapped.root'/></logical>
    <metadata att_value="64" att_name="events"/>
    <metadata att_name='guid' att_value='abc-1'/>
  </File>
  <File ID="B2">
    <logical><lfn  name = "plain.root" /></logical>
    <metadata  att_value = '6'  att_name = 'events' />
  </File>
</POOLFILECATALOG>"#;
    let md = parse_metadata(xml).unwrap();
    assert_eq!(md["swapped.root"]["events"], "64");
    assert_eq!(md["swapped.root"]["guid"], "abc-1");
    assert_eq!(md["plain.root"]["events"], "6");
    assert_eq!(total_number_of_events(&md), 70);
}

#[test]
fn summary_found_under_workdir_with_glob_characters() {
    let tmp = TempDir::new().unwrap();
    let workdir = tmp.path().join("job[1]");
    std::fs::create_dir(&workdir).unwrap();
    write(&workdir, "AthSummary.txt", "Events Read: 12\nEvents Written: 11\n");
    assert_eq!(counts(&workdir), (12, 11));
}
