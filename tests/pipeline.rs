use std::fs;
use std::io::{Cursor, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use isoclass::eval::evaluate;
use isoclass::output::{read_classification_path, write_classification_path, write_rejected_path};
use isoclass::{
    classify_all, AnnotationBuilder, CagePeakLocator, ClassifyOptions, ReferenceIndex, StructuralCategory,
};

// G1 (+): T1 = 101-200, 301-400, 501-600 ; T2 = 101-200, 301-400, 701-800
// G2 (-): T3 = 2001-2100, 2201-2300
// G3 (+): T4 = 3001-3100, 3201-3300 ; G4 (+): T5 = 3401-3500, 3601-3700
const REFERENCE: &str = "\
##gff-version 2
chr1\tsrc\ttranscript\t101\t600\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t101\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t301\t400\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t501\t600\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\ttranscript\t101\t800\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T2\";
chr1\tsrc\texon\t101\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T2\";
chr1\tsrc\texon\t301\t400\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T2\";
chr1\tsrc\texon\t701\t800\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T2\";
chr1\tsrc\ttranscript\t2001\t2300\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T3\";
chr1\tsrc\texon\t2001\t2100\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T3\";
chr1\tsrc\texon\t2201\t2300\t.\t-\t.\tgene_id \"G2\"; transcript_id \"T3\";
chr1\tsrc\ttranscript\t3001\t3300\t.\t+\t.\tgene_id \"G3\"; transcript_id \"T4\";
chr1\tsrc\texon\t3001\t3100\t.\t+\t.\tgene_id \"G3\"; transcript_id \"T4\";
chr1\tsrc\texon\t3201\t3300\t.\t+\t.\tgene_id \"G3\"; transcript_id \"T4\";
chr1\tsrc\ttranscript\t3201\t3700\t.\t+\t.\tgene_id \"G4\"; transcript_id \"T5\";
chr1\tsrc\texon\t3201\t3300\t.\t+\t.\tgene_id \"G4\"; transcript_id \"T5\";
chr1\tsrc\texon\t3401\t3500\t.\t+\t.\tgene_id \"G4\"; transcript_id \"T5\";
chr1\tsrc\texon\t3601\t3700\t.\t+\t.\tgene_id \"G4\"; transcript_id \"T5\";
";

// One query per category (plus one rejected), in a fixed order.
const QUERIES: &str = "\
chr1\tsrc\texon\t121\t200\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fsm\";
chr1\tsrc\texon\t301\t400\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fsm\";
chr1\tsrc\texon\t501\t580\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fsm\";
chr1\tsrc\texon\t331\t400\t.\t+\t.\tgene_id \"Q\"; transcript_id \"ism\";
chr1\tsrc\texon\t501\t600\t.\t+\t.\tgene_id \"Q\"; transcript_id \"ism\";
chr1\tsrc\texon\t101\t200\t.\t+\t.\tgene_id \"Q\"; transcript_id \"nnc\";
chr1\tsrc\texon\t501\t600\t.\t+\t.\tgene_id \"Q\"; transcript_id \"nnc\";
chr1\tsrc\texon\t3001\t3100\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fusion\";
chr1\tsrc\texon\t3201\t3300\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fusion\";
chr1\tsrc\texon\t3401\t3500\t.\t+\t.\tgene_id \"Q\"; transcript_id \"fusion\";
chr1\tsrc\texon\t2021\t2080\t.\t+\t.\tgene_id \"Q\"; transcript_id \"antisense\";
chr1\tsrc\texon\t331\t370\t.\t+\t.\tgene_id \"Q\"; transcript_id \"genic\";
chr1\tsrc\texon\t2121\t2180\t.\t+\t.\tgene_id \"Q\"; transcript_id \"intronic\";
chr1\tsrc\texon\t9001\t9100\t.\t+\t.\tgene_id \"Q\"; transcript_id \"intergenic\";
chr1\tsrc\texon\t9001\t9100\t.\t.\t.\tgene_id \"Q\"; transcript_id \"nostrand\";
";

const PEAKS: &str = "\
chr1\t100\t140\tp1\t10\t+\t120\t121
chr1\t8900\t8950\tp2\t10\t+\t8920\t8921
";

fn gzip(text: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}

#[test]
fn classifies_every_category_end_to_end() {
    let dir = tempdir().unwrap();
    let ref_path = dir.path().join("reference.gtf.gz");
    let query_path = dir.path().join("queries.gtf");
    let peak_path = dir.path().join("peaks.bed");
    fs::write(&ref_path, gzip(REFERENCE)).unwrap();
    fs::write(&query_path, QUERIES).unwrap();
    fs::write(&peak_path, PEAKS).unwrap();

    let builder = AnnotationBuilder::new();
    let reference = builder.build_from_path(&ref_path).unwrap();
    assert_eq!(reference.transcripts.len(), 5);

    let index_path = dir.path().join("reference.isx");
    reference.save(&index_path).unwrap();
    let reference = ReferenceIndex::load(&index_path).unwrap();

    let queries = builder.load_queries_from_path(&query_path).unwrap();
    assert_eq!(queries.rejected.len(), 1);

    let peaks = CagePeakLocator::from_path(&peak_path, 0.1).unwrap();
    let outcome = classify_all(&queries.transcripts, &reference, Some(&peaks), &ClassifyOptions::default());
    assert!(outcome.rejected.is_empty());

    let got: Vec<(&str, StructuralCategory)> = outcome
        .records
        .iter()
        .map(|r| (r.query_id.as_str(), r.category))
        .collect();
    assert_eq!(
        got,
        vec![
            ("fsm", StructuralCategory::FullSpliceMatch),
            ("ism", StructuralCategory::IncompleteSpliceMatch),
            ("nnc", StructuralCategory::NovelNotInCatalog),
            ("fusion", StructuralCategory::Fusion),
            ("antisense", StructuralCategory::Antisense),
            ("genic", StructuralCategory::Genic),
            ("intronic", StructuralCategory::GenicIntron),
            ("intergenic", StructuralCategory::Intergenic),
        ]
    );

    let fsm = &outcome.records[0];
    assert_eq!(fsm.matched_transcript_ids, vec!["T1".to_string()]);
    let cage = fsm.cage.unwrap();
    assert!(cage.within_peak);
    assert_eq!(cage.distance, Some(0));

    let fusion = &outcome.records[3];
    assert_eq!(fusion.matched_gene_ids, vec!["G3".to_string(), "G4".to_string()]);

    let intergenic = &outcome.records[7];
    assert_eq!(intergenic.cage.unwrap().distance, Some(80));

    let table = dir.path().join("out_classification.tsv");
    write_classification_path(&table, &outcome.records, true).unwrap();
    write_rejected_path(dir.path().join("out_rejected.tsv"), &queries.rejected).unwrap();
    let rejected = fs::read_to_string(dir.path().join("out_rejected.tsv")).unwrap();
    assert!(rejected.lines().nth(1).unwrap().starts_with("nostrand\t"));

    // A table scored against itself is perfect in every category present.
    let rows = read_classification_path(&table).unwrap();
    assert_eq!(rows.len(), 8);
    for m in evaluate(&rows, &rows) {
        assert_eq!((m.fp, m.fn_), (0, 0), "{}", m.category);
        assert_eq!(m.precision(), Some(1.0));
    }
}

#[test]
fn reference_reclassified_against_itself_is_fsm() {
    let reference = AnnotationBuilder::new()
        .build_from_reader(Cursor::new(REFERENCE.as_bytes()))
        .unwrap();
    let queries = AnnotationBuilder::new()
        .load_queries_from_reader(Cursor::new(REFERENCE.as_bytes()))
        .unwrap();

    let outcome = classify_all(&queries.transcripts, &reference, None, &ClassifyOptions::default());
    let got: Vec<(String, StructuralCategory, Vec<String>)> = outcome
        .records
        .into_iter()
        .map(|r| (r.query_id, r.category, r.matched_transcript_ids))
        .collect();
    let want: Vec<(String, StructuralCategory, Vec<String>)> = ["T1", "T2", "T3", "T4", "T5"]
        .iter()
        .map(|t| (t.to_string(), StructuralCategory::FullSpliceMatch, vec![t.to_string()]))
        .collect();
    assert_eq!(got, want);
}

#[test]
fn classification_is_deterministic_across_thread_counts() {
    let reference = AnnotationBuilder::new()
        .build_from_reader(Cursor::new(REFERENCE.as_bytes()))
        .unwrap();
    let queries = AnnotationBuilder::new()
        .load_queries_from_reader(Cursor::new(QUERIES.as_bytes()))
        .unwrap();
    let opts = ClassifyOptions::default();

    let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let one = single.install(|| classify_all(&queries.transcripts, &reference, None, &opts));
    let many = classify_all(&queries.transcripts, &reference, None, &opts);
    assert_eq!(one.records, many.records);
}

#[test]
fn broken_reference_is_fatal() {
    let broken = "\
chr1\tsrc\ttranscript\t101\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t101\t200\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t301\t400\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T7\";
";
    let err = AnnotationBuilder::new()
        .build_from_reader(Cursor::new(broken.as_bytes()))
        .unwrap_err();
    assert!(matches!(err, isoclass::Error::MalformedAnnotation { .. }));
}
