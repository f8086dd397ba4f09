// "source" - opens and page-addresses the main database file and an optional WAL
// sidecar, providing on-demand cached reads.
// "header"/"page"/"btree"/"cell"/"schema"/"freelist"/"pointermap" - the file-format
// decoder.
// "pipeline" - sweeps the main file and the WAL into record/recovered tuples.
// "classify" - assigns record status across frame versions.
// Argument parsing and output formatting below are the external CLI collaborator;
// the decoder itself knows nothing about flags or stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use sqlite_forensics::{ExtractionOptions, ExtractionResult};

struct Args {
    main_path: PathBuf,
    wal_path: Option<PathBuf>,
    classify: bool,
    keyword: Option<String>,
}

fn print_usage() {
    eprintln!(
        "usage: sqlite-forensics --main <path> [--wal <path>] [--classify] [--keyword <word>]"
    );
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let _argv0 = args.next();
    let mut main_path = None;
    let mut wal_path = None;
    let mut classify = false;
    let mut keyword = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--main" => {
                main_path = Some(PathBuf::from(args.next().ok_or("--main requires a path")?));
            }
            "--wal" => {
                wal_path = Some(PathBuf::from(args.next().ok_or("--wal requires a path")?));
            }
            "--classify" => classify = true,
            "--keyword" => {
                keyword = Some(args.next().ok_or("--keyword requires a word")?);
            }
            other => return Err(format!("unrecognized argument: {}", other)),
        }
    }

    Ok(Args {
        main_path: main_path.ok_or("--main is required")?,
        wal_path,
        classify,
        keyword,
    })
}

fn print_records(result: &ExtractionResult) {
    let header = [
        "Source_File",
        "Frame",
        "Page",
        "Status",
        "Table",
        "Offset",
        "RowID",
        "Values",
    ];
    let rows: Vec<[String; 8]> = result
        .records
        .iter()
        .map(|r| {
            let values = r
                .values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            [
                r.source_file_name.clone(),
                r.frame_number.to_string(),
                r.page_number.to_string(),
                r.record_status.to_string(),
                r.table_name.clone(),
                r.file_offset_of_cell.to_string(),
                r.rowid.to_string(),
                if r.partial { format!("{} (partial)", values) } else { values },
            ]
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let print_row = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
            .collect();
        println!("| {} |", padded.join(" | "));
    };

    print_row(&header.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    for row in &rows {
        print_row(row);
    }
    println!("{} record(s), {} recovered fragment(s)", result.records.len(), result.recovered.len());
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(std::env::args()) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("error: {}", msg);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let options = ExtractionOptions {
        main_path: args.main_path,
        wal_path: args.wal_path,
        classify: args.classify,
        keyword: args.keyword,
    };

    match sqlite_forensics::run(&options) {
        Ok(result) => {
            print_records(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}
