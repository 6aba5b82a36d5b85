use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    time::Instant,
};

use clap::Parser;
use mtscore::{DecoderConfig, ScoredOption, Sentence, System, TranslationTask};

/// Look up and score the translation options of each input sentence
/// If no FILE is given, sentences are read from STDIN, one per line
#[derive(Debug, Parser)]
#[command(version)]
struct Argv {
    /// read the decoder configuration (JSON) from CONFIG
    #[arg(short, long, value_name = "CONFIG")]
    config: PathBuf,
    /// number of worker threads
    #[arg(short, long, default_value_t = 1)]
    threads: usize,
    /// print at most N options per source span, 0 for all
    #[arg(short = 'n', long, default_value_t = 0)]
    nbest: usize,
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,
}

fn render(system: &System, id: usize, options: &[ScoredOption]) -> String {
    let mut out = String::new();
    for o in options {
        let scores: Vec<String> = [&o.scores, &o.estimated]
            .into_iter()
            .flat_map(|b| {
                b.producers()
                    .map(move |f| format!("{}={:?}", system.layout().name(f), b.get(f).unwrap_or(&[])))
            })
            .collect();
        out.push_str(&format!(
            "{} ||| [{}, {}] ||| {} ||| {} ||| {:.4}\n",
            id,
            o.option.range.start,
            o.option.range.end,
            o.option.target.phrase,
            scores.join(" "),
            o.total
        ));
    }
    out
}

fn keep_nbest(mut options: Vec<ScoredOption>, n: usize) -> Vec<ScoredOption> {
    if n == 0 {
        return options;
    }
    options.sort_by(|a, b| {
        (a.option.range.start, a.option.range.end)
            .cmp(&(b.option.range.start, b.option.range.end))
            .then(b.total.total_cmp(&a.total))
    });
    let mut kept: Vec<ScoredOption> = Vec::with_capacity(options.len());
    let mut run = 0;
    for o in options {
        match kept.last() {
            Some(prev) if prev.option.range == o.option.range => run += 1,
            _ => run = 1,
        }
        if run <= n {
            kept.push(o);
        }
    }
    kept
}

/// Scores every line on `threads` workers and returns the rendered options
/// in input order. A failed sentence stops its worker and fails the run.
fn translate(system: &System, lines: &[String], threads: usize, nbest: usize) -> mtscore::Result<Vec<String>> {
    let threads = threads.max(1);
    let mut rendered: Vec<Option<mtscore::Result<String>>> = (0..lines.len()).map(|_| None).collect();
    std::thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|w| {
                s.spawn(move || {
                    let mut done = Vec::new();
                    for (id, line) in lines.iter().enumerate().skip(w).step_by(threads) {
                        let mut task = TranslationTask::new(system, Sentence::new(id, line));
                        let result = task
                            .collect_options()
                            .map(|options| render(system, id, &keep_nbest(options, nbest)));
                        let failed = result.is_err();
                        if let Err(e) = &result {
                            log::error!("sentence {id}: {e}");
                        }
                        done.push((id, result));
                        if failed {
                            break;
                        }
                    }
                    done
                })
            })
            .collect();
        for worker in workers {
            for (id, result) in worker.join().expect("worker panicked") {
                rendered[id] = Some(result);
            }
        }
    });
    // sentences a stopped worker skipped come after its failure
    rendered.into_iter().flatten().collect()
}

fn main() {
    env_logger::init();
    let argv = Argv::parse();
    log::info!("argv: {:?}", argv);

    let config = DecoderConfig::from_path(&argv.config).expect("failed to read config");
    let begin = Instant::now();
    let system = System::load(&config).expect("failed to load models");
    log::info!("loading took {:?}", begin.elapsed());

    let reader: Box<dyn BufRead> = match &argv.input {
        Some(path) => Box::new(BufReader::new(File::open(path).expect("failed to open input"))),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let lines: Vec<String> = reader
        .lines()
        .collect::<io::Result<_>>()
        .expect("failed to read input");

    let begin = Instant::now();
    let rendered = match translate(&system, &lines, argv.threads, argv.nbest) {
        Ok(rendered) => rendered,
        Err(e) => {
            log::error!("aborting: {e}");
            std::process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for text in rendered {
        out.write_all(text.as_bytes()).expect("failed to write output");
    }
    log::info!("{} sentences took {:?}", lines.len(), begin.elapsed());
}
