use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use eternity_batch::board::{self, InstanceDisplay};
use eternity_batch::{BatchedEternityEnv, EnvConfig};
use log::{debug, info};
use rand::{rngs::StdRng, SeedableRng};

/// Random-policy rollouts on a generated puzzle.
#[derive(Debug, Parser)]
#[command(author, version, about = "Run random-policy rollouts on a batched edge-matching puzzle")]
struct Args {
    /// Board side length
    #[arg(long, default_value_t = 4)]
    size: usize,

    /// Number of interior edge classes in the generated puzzle
    #[arg(long, default_value_t = 5)]
    classes: i64,

    /// Optional TOML file with batch settings (batch_size, max_steps, seed, reward)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of episodes to play
    #[arg(long, default_value_t = 10)]
    episodes: usize,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the configured seed
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads for match scoring (defaults to Rayon default)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("building rayon thread pool")?;
    }

    let mut config = match &args.config {
        Some(path) => EnvConfig::from_toml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EnvConfig::default(),
    };
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let puzzle = board::solved_instance(args.size, args.classes, &mut rng)?;
    let mut env = BatchedEternityEnv::from_config(puzzle.into_dyn(), &config)?;
    info!(
        "{} instances of {}x{} ({} classes), {} steps per episode",
        env.batch_size(),
        env.board_size(),
        env.board_size(),
        env.n_classes(),
        env.max_steps()
    );

    let start = Instant::now();
    let mut total_steps = 0usize;
    for episode in 0..args.episodes {
        env.reset(None);
        let mut returns = vec![0f32; env.batch_size()];
        loop {
            let actions = env.sample_actions(&mut rng);
            let step = env.step(actions.view());
            for (ret, reward) in returns.iter_mut().zip(step.rewards.iter()) {
                *ret += reward;
            }
            total_steps += 1;
            if step.truncated {
                break;
            }
        }

        let matches = env.matches();
        let best = env.best_possible_matches() as f64;
        let mean = matches.iter().map(|&m| m as f64).sum::<f64>() / env.batch_size() as f64;
        let solved = env.terminated().iter().filter(|&&t| t).count();
        let mean_return = returns.iter().sum::<f32>() / returns.len() as f32;
        info!(
            "episode {episode}: mean matches {:.3} | mean return {:+.3} | solved {solved}/{}",
            mean / best,
            mean_return,
            env.batch_size()
        );
    }

    let stats = env.stats();
    let elapsed = start.elapsed().as_secs_f64().max(1e-6);
    info!(
        "best matches ever {}/{} | rolling matches {:.2} | total won {} | {:.1} batched steps/sec",
        stats.best_matches_ever,
        env.best_possible_matches(),
        stats.rolling_matches,
        stats.total_won,
        total_steps as f64 / elapsed
    );
    if let Some(best) = env.best_board_ever() {
        debug!("best board:\n{}", InstanceDisplay(best));
    }
    Ok(())
}
