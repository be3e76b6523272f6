use clap::{Parser, Subcommand};
use ndarray::{Array2, ArrayView1};
use std::process;

use voxelfit::cv::{evenly_spaced_run_onsets, generate_leave_one_run_out};
use voxelfit::data::{load_matrix, load_run_onsets, zero_fill_non_finite};
use voxelfit::diagnostics::alpha_grid_report;
use voxelfit::model::EncodingModel;
use voxelfit::pipeline::EncodingPipeline;
use voxelfit::ridge::{logspace, Formulation, SolverParams};
use voxelfit::scoring::r2_score;

#[derive(Parser)]
#[command(
    name = "voxelfit",
    about = "Fit voxelwise encoding models with cross-validated ridge regression",
    long_about = "Fits a regularized linear encoding model that predicts multi-target \
                  responses from stimulus features, using delay embedding and \
                  leave-one-run-out cross-validation for per-target regularization."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an encoding model from feature and response matrices
    #[command(about = "Fit an encoding model (outputs: model.toml)")]
    Train {
        /// Path to the TSV of stimulus features (rows = time samples)
        #[arg(long)]
        features: String,

        /// Path to the TSV of responses (rows = time samples, columns = targets)
        #[arg(long)]
        responses: String,

        /// Path to a single-column TSV with the first sample index of each run
        #[arg(long)]
        run_onsets: Option<String>,

        /// Run length in samples, for recordings made of equal-length runs
        #[arg(long)]
        run_length: Option<usize>,

        /// Comma-separated feature delays, in samples
        #[arg(long, default_value = "1,2,3,4", value_delimiter = ',')]
        delays: Vec<usize>,

        /// Base-10 exponent of the smallest regularization candidate
        #[arg(long, default_value = "1.0")]
        alpha_min_exp: f64,

        /// Base-10 exponent of the largest regularization candidate
        #[arg(long, default_value = "20.0")]
        alpha_max_exp: f64,

        /// Number of candidates in the logarithmic regularization grid
        #[arg(long, default_value = "20")]
        n_alphas: usize,

        /// Target columns solved per batch
        #[arg(long, default_value = "512")]
        n_targets_batch: usize,

        /// Output path for the trained model
        #[arg(long, default_value = "model.toml")]
        model_out: String,

        /// Optional output path for the per-target training-fit R^2 scores
        #[arg(long)]
        scores_out: Option<String>,
    },

    /// Apply a trained model to new data
    #[command(about = "Apply a trained model (outputs: predictions.tsv)")]
    Infer {
        /// Path to the TSV of stimulus features (rows = time samples)
        #[arg(long)]
        features: String,

        /// Path to the trained model file (.toml)
        #[arg(long)]
        model: String,

        /// Optional TSV of responses to score the predictions against
        #[arg(long)]
        responses: Option<String>,

        /// Output path for the predictions
        #[arg(long, default_value = "predictions.tsv")]
        predictions_out: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Train {
            features,
            responses,
            run_onsets,
            run_length,
            delays,
            alpha_min_exp,
            alpha_max_exp,
            n_alphas,
            n_targets_batch,
            model_out,
            scores_out,
        } => train_command(
            &features,
            &responses,
            run_onsets.as_deref(),
            run_length,
            delays,
            alpha_min_exp,
            alpha_max_exp,
            n_alphas,
            n_targets_batch,
            &model_out,
            scores_out.as_deref(),
        ),
        Commands::Infer {
            features,
            model,
            responses,
            predictions_out,
        } => infer_command(&features, &model, responses.as_deref(), &predictions_out),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn train_command(
    features_path: &str,
    responses_path: &str,
    run_onsets_path: Option<&str>,
    run_length: Option<usize>,
    delays: Vec<usize>,
    alpha_min_exp: f64,
    alpha_max_exp: f64,
    n_alphas: usize,
    n_targets_batch: usize,
    model_out: &str,
    scores_out: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let x_train = load_matrix(features_path)?;
    let mut y_train = load_matrix(responses_path)?;
    println!(
        "Loaded {} samples: {} features, {} targets",
        x_train.nrows(),
        x_train.ncols(),
        y_train.ncols()
    );

    // Non-cortical targets carry NaNs; substitute them before fitting.
    let replaced = zero_fill_non_finite(&mut y_train);
    if replaced > 0 {
        println!("Zero-filled {replaced} non-finite response values");
    }

    let n_samples = x_train.nrows();
    let onsets = match (run_onsets_path, run_length) {
        (Some(path), _) => load_run_onsets(path)?,
        (None, Some(length)) => evenly_spaced_run_onsets(n_samples, length)?,
        (None, None) => {
            return Err("provide either --run-onsets or --run-length".into());
        }
    };
    let splits = generate_leave_one_run_out(n_samples, &onsets)?;
    println!(
        "{} runs -> {} leave-one-run-out splits",
        onsets.len(),
        splits.len()
    );

    let alphas = logspace(alpha_min_exp, alpha_max_exp, n_alphas);
    let mut pipeline = EncodingPipeline::new(
        delays,
        alphas.clone(),
        splits,
        Formulation::Auto,
        SolverParams { n_targets_batch },
    )?;

    println!("Fitting encoding pipeline...");
    pipeline.fit(x_train.view(), y_train.view())?;

    // Check the grid scale: many targets at the top edge usually means the
    // grid should extend further, except for targets with no signal.
    let report = alpha_grid_report(pipeline.best_alphas()?, &alphas)?;
    println!(
        "Alpha grid: {} of {} targets at the top edge ({:.1}%), {} at the bottom edge",
        report.n_at_upper_edge,
        report.n_targets,
        100.0 * report.upper_edge_fraction(),
        report.n_at_lower_edge
    );

    let model = pipeline.to_model()?;
    model.save(model_out)?;
    println!("Model saved to: {model_out}");

    if let Some(path) = scores_out {
        let scores = pipeline.score(x_train.view(), y_train.view())?;
        save_scores_tsv(scores.view(), path)?;
        println!("Training-fit scores saved to: {path}");
    }

    Ok(())
}

fn infer_command(
    features_path: &str,
    model_path: &str,
    responses_path: Option<&str>,
    predictions_out: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from: {model_path}");
    let model = EncodingModel::load(model_path)?;
    println!(
        "Model expects {} features; {} targets",
        model.n_features(),
        model.n_targets()
    );

    let x = load_matrix(features_path)?;
    let predictions = model.predict(x.view())?;
    save_matrix_tsv(&predictions, predictions_out)?;
    println!("Predictions saved to: {predictions_out}");

    if let Some(path) = responses_path {
        let mut y = load_matrix(path)?;
        zero_fill_non_finite(&mut y);
        let scores = r2_score(y.view(), predictions.view())?;
        println!(
            "Mean generalization R^2 over {} targets: {:.4}",
            scores.len(),
            scores.mean().unwrap_or(0.0)
        );
    }

    Ok(())
}

/// Writes per-target scores to a TSV file, one target per row.
fn save_scores_tsv(scores: ArrayView1<f64>, output_path: &str) -> Result<(), std::io::Error> {
    use std::io::Write;

    let mut file = std::fs::File::create(output_path)?;
    writeln!(file, "target\tr2")?;
    for (index, value) in scores.iter().enumerate() {
        writeln!(file, "{index}\t{value:.6}")?;
    }
    Ok(())
}

/// Writes a prediction matrix to a TSV file, one target per column.
fn save_matrix_tsv(matrix: &Array2<f64>, output_path: &str) -> Result<(), std::io::Error> {
    use std::io::Write;

    let mut file = std::fs::File::create(output_path)?;
    let header: Vec<String> = (0..matrix.ncols()).map(|j| format!("target_{j}")).collect();
    writeln!(file, "{}", header.join("\t"))?;

    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        writeln!(file, "{}", line.join("\t"))?;
    }

    Ok(())
}
