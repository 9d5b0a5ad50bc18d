//! Command-line demo driver for the tracemin eigensolver.
//!
//! Solves a built-in eigenproblem (diagonal spectrum or 1-D Laplacian)
//! and prints the lowest eigenvalues. Mainly a smoke test and a
//! playground for the solver flags; progress logs go to stderr and are
//! controlled by `RUST_LOG` / `--verbose` / `--quiet`.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;
use tracemin_backend_cpu::CpuBackend;
use tracemin_core::{
    block::BlockMatrix,
    eigensolver::{EigenOptions, LineSearchPolicy, TraceMinResult, minimize_trace},
    error::EigenError,
    operator::{
        BlockOperator, BlockPreconditioner, DiagonalOperator, DiagonalPreconditioner, Laplacian1D,
    },
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "tracemin",
    about = "Block PCG trace-minimization eigensolver demo"
)]
struct Cli {
    /// Built-in problem to solve
    #[arg(long, value_enum, default_value = "laplacian")]
    problem: ProblemArg,

    /// Problem size n (block rows)
    #[arg(short = 'n', long, default_value_t = 64)]
    size: usize,

    /// Number of eigenvalues / block columns p
    #[arg(short = 'p', long, default_value_t = 4)]
    bands: usize,

    /// Work blocks: 2 = steepest descent, 3 = Fletcher-Reeves CG,
    /// 4 = Polak-Ribière CG
    #[arg(long, default_value_t = 4)]
    work: usize,

    /// Fractional convergence tolerance on the trace
    #[arg(long, default_value_t = 1e-8)]
    tol: f64,

    /// Apply the diagonal (Jacobi) preconditioner
    #[arg(long)]
    precondition: bool,

    /// Project the preconditioned gradient onto the complement of Y
    #[arg(long)]
    project: bool,

    /// Periodically reset the CG direction to steepest descent
    #[arg(long)]
    reset_cg: bool,

    /// Line-search policy
    #[arg(long, value_enum, default_value = "auto")]
    line_search: LineSearchArg,

    /// Emit a progress line every iteration
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress logs (stderr)
    #[arg(long)]
    quiet: bool,

    /// Seed for the deterministic starting guess
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProblemArg {
    /// A = diag(1, 2, ..., n)
    Diagonal,
    /// 1-D Dirichlet Laplacian stencil
    Laplacian,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LineSearchArg {
    Auto,
    Exact,
    Approx,
}

impl From<LineSearchArg> for LineSearchPolicy {
    fn from(arg: LineSearchArg) -> Self {
        match arg {
            LineSearchArg::Auto => LineSearchPolicy::Auto,
            LineSearchArg::Exact => LineSearchPolicy::ForceExact,
            LineSearchArg::Approx => LineSearchPolicy::ForceApprox,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut builder = Builder::from_default_env();
    if cli.quiet {
        builder.filter_level(LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }
    builder.init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), EigenError> {
    let backend = CpuBackend::new();
    let options = EigenOptions {
        tolerance: cli.tol,
        verbose: cli.verbose,
        project_preconditioning: cli.project,
        reset_cg: cli.reset_cg,
        line_search: cli.line_search.into(),
        record_trace: false,
    };

    let result = match cli.problem {
        ProblemArg::Diagonal => {
            let diag: Vec<f64> = (1..=cli.size).map(|v| v as f64).collect();
            let preconditioner = cli
                .precondition
                .then(|| DiagonalPreconditioner::from_diagonal(&diag));
            let mut operator = DiagonalOperator::new(backend, diag);
            solve(&mut operator, preconditioner, cli, &options)?
        }
        ProblemArg::Laplacian => {
            let mut operator = Laplacian1D::new(backend, cli.size);
            let preconditioner = cli
                .precondition
                .then(|| DiagonalPreconditioner::from_diagonal(&vec![2.0; cli.size]));
            solve(&mut operator, preconditioner, cli, &options)?
        }
    };

    println!("converged in {} iterations", result.iterations);
    println!("trace = {:.12e}", result.trace);
    for (band, value) in result.eigenvalues.iter().enumerate() {
        println!("band {:>3}: {:.12e}", band + 1, value);
    }
    Ok(())
}

fn solve<O>(
    operator: &mut O,
    mut preconditioner: Option<DiagonalPreconditioner>,
    cli: &Cli,
    options: &EigenOptions,
) -> Result<TraceMinResult, EigenError>
where
    O: BlockOperator<CpuBackend>,
{
    let n = operator.rows();
    let mut y = BlockMatrix::seeded(n, cli.bands, cli.seed);
    let mut work = vec![BlockMatrix::zeros(n, cli.bands); cli.work];
    let preconditioner_ref = preconditioner
        .as_mut()
        .map(|k| k as &mut dyn BlockPreconditioner<CpuBackend>);
    minimize_trace(&mut y, operator, preconditioner_ref, None, &mut work, options)
}
