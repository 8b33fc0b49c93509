use flipgraph::prelude::*;
use rand_mt::Mt;

fn main() {
    let mut check_only = false;
    let mut path: Option<String> = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--check" => {
                check_only = true;
                i += 1;
            }
            "--help" | "-h" => usage_and_exit(0),
            arg if arg.starts_with('-') => usage_and_exit(2),
            arg => {
                if path.is_some() {
                    usage_and_exit(2);
                }
                path = Some(arg.to_string());
                i += 1;
            }
        }
    }
    let Some(path) = path else {
        usage_and_exit(2);
    };

    let state = match read_state(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{path}: {e}");
            std::process::exit(1);
        }
    };

    if check_only {
        match check_run_state(&state) {
            Ok(()) => {
                println!(
                    "Check OK: {} slots ({}-fold symmetry), {} live.",
                    state.header.nomuls,
                    state.header.symm,
                    state.muls.iter().filter(|&&m| m != 0).count()
                );
                return;
            }
            Err(e) => {
                eprintln!("Check FAILED: {e}");
                std::process::exit(1);
            }
        }
    }

    let header = state.header;
    let params = Params::from_header(&header);
    println!("--------------------------------------------------");
    println!(
        "Flip-graph search: {} slots ({}-fold symmetry), target {}",
        header.nomuls, header.symm, header.target
    );
    println!(
        "Budget: {} flips | plus schedule: {} | size screen: {} | seed: {}",
        header.flimit, header.plimit, header.maxsize, header.rseed
    );
    println!("--------------------------------------------------");

    let mut solver = Solver::new(params, state.muls, header.flips, Mt::new(header.rseed));
    solver.set_snapshot_path(&path);

    let stop = match solver.run() {
        Ok(stop) => stop,
        Err(e) => {
            eprintln!("{path}: snapshot write failed: {e}");
            std::process::exit(1);
        }
    };

    let snapshot = solver.snapshot_header(stop.code());
    if let Err(e) = write_state(&path, &snapshot, solver.output_values()) {
        eprintln!("{path}: final write failed: {e}");
        std::process::exit(1);
    }

    println!(
        "Stopped: {stop}. Flips: {} | live: {} | best: {} | plus slots: {}",
        solver.flips(),
        solver.achieved(),
        solver.minmuls(),
        solver.plus_moves()
    );
}

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage:\n  flipgraph STATEFILE\n  flipgraph --check STATEFILE\n\nThe state file is both input and output: it is overwritten on completion\nand at every recovery snapshot.\n\nOptions:\n  --check    Parse and validate the state file without searching\n  --help     Show this message\n"
    );
    std::process::exit(code)
}
