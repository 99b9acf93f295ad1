//! Offline generator for the tetrahedron refinement rule base.
//!
//! Usage: `generate_rules MIN_REF_EDGES MAX_REF_EDGES [-o] [-s]`
//!
//! Enumerates every refinement rule for patterns with `MIN..=MAX` refined
//! edges. `-o` dumps the generated rules to stdout for audit, `-s` saves
//! the table to `RefRules.data` in the current directory.

use std::process::ExitCode;

use tetref::rules::generate::generate_rules;
use tetref::simplex::EDGES_OF_ELEM;

fn usage() {
    eprintln!("usage: generate_rules <min # of refined edges> <max # of refined edges> [-o] [-s]");
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        usage();
        return ExitCode::FAILURE;
    }

    let Ok(min_edges) = args[0].parse::<usize>() else {
        usage();
        return ExitCode::FAILURE;
    };
    let Ok(max_edges) = args[1].parse::<usize>() else {
        usage();
        return ExitCode::FAILURE;
    };

    if min_edges > EDGES_OF_ELEM || max_edges > EDGES_OF_ELEM {
        eprintln!("ERROR: # of refined edges out of range");
        return ExitCode::FAILURE;
    }
    if max_edges < min_edges {
        eprintln!("ERROR: min # of refined edges > max");
        return ExitCode::FAILURE;
    }

    let output = args[2..].iter().any(|a| a == "-o");
    let save = args[2..].iter().any(|a| a == "-s");

    let table = generate_rules(min_edges, max_edges, output);

    if output {
        for (id, rule) in table.rules().iter().enumerate() {
            println!("### rule no {id:3} ###");
            print!("{rule}");
            println!("### end of rule ###");
        }
    }

    println!("{} rules generated", table.len());

    if save {
        if let Err(err) = table.save("RefRules.data") {
            eprintln!("ERROR: could not save 'RefRules.data': {err}");
            return ExitCode::FAILURE;
        }
        println!("rule table saved to 'RefRules.data'");
    }

    ExitCode::SUCCESS
}
