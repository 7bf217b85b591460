use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{
    enroll, AggregateError, CosineMatcher, Embedding, FeatureBuilder, Matcher, PipelineError,
};
use rollcall_store::{person_dirs, read_sample, sample_paths, Config, RegistryStore, StoreError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall face attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one person from landmark sample files or directories
    Enroll {
        /// Identity name
        #[arg(short, long)]
        name: String,
        /// Sample files (or directories of sample files)
        #[arg(required = true)]
        samples: Vec<PathBuf>,
    },
    /// Enroll every person subdirectory of the samples directory
    Train {
        /// Samples root (default: ROLLCALL_SAMPLES_DIR)
        dir: Option<PathBuf>,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        name: String,
    },
    /// Match one sample against the registry
    Match {
        sample: PathBuf,
    },
    /// Cosine similarity between two samples
    Compare {
        a: PathBuf,
        b: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let store = RegistryStore::new(&config.registry_dir);

    match cli.command {
        Commands::Enroll { name, samples } => {
            let builder = config.feature_builder()?;
            let files = expand_samples(&samples)?;
            match train(&builder, &store, &name, &files)? {
                Some(path) => println!("Saved {name}: {}", path.display()),
                None => bail!("no valid faces found for {name}"),
            }
        }
        Commands::Train { dir } => {
            let builder = config.feature_builder()?;
            let root = dir.unwrap_or_else(|| config.samples_dir.clone());
            let people = person_dirs(&root)?;
            if people.is_empty() {
                println!("No person directories in {}", root.display());
            }
            let mut failed = 0;
            for (name, person_dir) in people {
                let files = sample_paths(&person_dir)?;
                match train(&builder, &store, &name, &files)? {
                    Some(path) => println!("Saved {name}: {}", path.display()),
                    None => {
                        println!("Could not train {name}: no valid faces found");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                tracing::warn!(failed, "some identities could not be trained");
            }
        }
        Commands::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("No identities enrolled");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Remove { name } => match store.remove(&name) {
            Ok(()) => println!("Removed {name}"),
            Err(StoreError::NotFound(_)) => bail!("no identity named {name}"),
            Err(e) => return Err(e.into()),
        },
        Commands::Match { sample } => {
            let builder = config.feature_builder()?;
            let Some(query) = embed_file(&builder, &sample)? else {
                println!("No face detected");
                return Ok(());
            };
            let registry = store.load_all()?;
            let result = CosineMatcher.best_match(&query, &registry)?;
            match (&result.best, result.accepted(config.similarity_threshold)) {
                (None, _) => println!("No identities enrolled"),
                (Some(best), Some(_)) => println!("Match: {} (similarity {:.4})", best.name, best.similarity),
                (Some(best), None) => println!(
                    "Unknown (closest {} at {:.4}, threshold {:.4})",
                    best.name, best.similarity, config.similarity_threshold
                ),
            }
            if result.degenerate {
                println!("Warning: degenerate embedding, score is not meaningful");
            }
        }
        Commands::Compare { a, b } => {
            let builder = config.feature_builder()?;
            let (Some(ea), Some(eb)) = (embed_file(&builder, &a)?, embed_file(&builder, &b)?) else {
                bail!("no face detected in one of the samples");
            };
            let similarity = compare_embeddings(&ea, &eb)?;
            println!("{similarity:.6}");
            if ea.degenerate || eb.degenerate || ea.norm() == 0.0 || eb.norm() == 0.0 {
                println!("Warning: degenerate embedding, score is not meaningful");
            }
        }
    }

    Ok(())
}

/// Build, aggregate and save one identity. `Ok(None)` when no sample had a face.
fn train(
    builder: &FeatureBuilder,
    store: &RegistryStore,
    name: &str,
    files: &[PathBuf],
) -> Result<Option<PathBuf>> {
    let mut detections = Vec::with_capacity(files.len());
    for file in files {
        println!("Processing {name}: {}", file.display());
        detections.push(read_sample(file)?);
    }

    match enroll(builder, name, detections.iter().map(Option::as_ref)) {
        Ok(enrollment) => {
            if enrollment.skipped > 0 {
                println!("  {} of {} samples had no face", enrollment.skipped, files.len());
            }
            Ok(Some(store.save(&enrollment.identity)?))
        }
        Err(PipelineError::Aggregate(AggregateError::EmptyEnrollmentSet)) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("training {name}")),
    }
}

fn embed_file(builder: &FeatureBuilder, path: &Path) -> Result<Option<Embedding>> {
    let detection = read_sample(path)?;
    builder
        .build_detection(detection.as_ref())
        .with_context(|| format!("building embedding for {}", path.display()))
}

/// Cosine similarity of two embeddings, refusing shape mismatches.
fn compare_embeddings(a: &Embedding, b: &Embedding) -> Result<f32> {
    if !a.scheme_compatible(b) {
        bail!(
            "embeddings were built with different schemes ({} vs {})",
            a.scheme.as_deref().unwrap_or("untagged"),
            b.scheme.as_deref().unwrap_or("untagged")
        );
    }
    match a.similarity(b) {
        Some(similarity) => Ok(similarity),
        None => bail!("embedding dimensions differ ({} vs {})", a.dim(), b.dim()),
    }
}

/// Files as given, directories expanded to their sample files.
fn expand_samples(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(sample_paths(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::MESH_PAIRS_V1;

    const L: usize = 300;

    fn write_sample(path: &Path, seed: Option<f32>) {
        let landmarks: Option<Vec<[f32; 3]>> = seed.map(|seed| {
            (0..L)
                .map(|i| {
                    let t = i as f32 * (0.05 + seed);
                    [0.5 + 0.25 * t.sin(), 0.5 + 0.25 * t.cos(), 0.01 * t]
                })
                .collect()
        });
        let json = serde_json::json!({ "landmarks": landmarks });
        std::fs::write(path, json.to_string()).unwrap();
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(MESH_PAIRS_V1, L).unwrap()
    }

    #[test]
    fn test_train_saves_identity() {
        let dir = tempfile::tempdir().unwrap();
        let samples = dir.path().join("samples");
        std::fs::create_dir(&samples).unwrap();
        write_sample(&samples.join("1.json"), Some(0.4));
        write_sample(&samples.join("2.json"), None);
        write_sample(&samples.join("3.json"), Some(0.41));

        let store = RegistryStore::new(dir.path().join("registry"));
        let files = expand_samples(&[samples]).unwrap();
        assert_eq!(files.len(), 3);

        let path = train(&builder(), &store, "alice", &files).unwrap().unwrap();
        assert!(path.ends_with("alice_embedding.json"));
        let identity = store.load("alice").unwrap();
        assert_eq!(identity.embedding.dim(), 3 * L + 7);
    }

    #[test]
    fn test_train_without_faces() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("none.json");
        write_sample(&sample, None);
        let store = RegistryStore::new(dir.path().join("registry"));
        assert!(train(&builder(), &store, "ghost", &[sample]).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_embed_file_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("none.json");
        write_sample(&sample, None);
        assert!(embed_file(&builder(), &sample).unwrap().is_none());

        let face = dir.path().join("face.json");
        write_sample(&face, Some(0.2));
        let emb = embed_file(&builder(), &face).unwrap().unwrap();
        assert_eq!(emb.dim(), 3 * L + 7);
    }

    #[test]
    fn test_compare_rejects_mismatched_dims() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 5.0, 5.0]);
        let err = compare_embeddings(&a, &b).unwrap_err();
        assert!(err.to_string().contains("dimensions differ"));

        let v1 = Embedding::new(vec![1.0, 0.0]).with_scheme("mesh-pairs/v1");
        let v2 = Embedding::new(vec![1.0, 0.0]).with_scheme("mesh-pairs/v2");
        assert!(compare_embeddings(&v1, &v2).is_err());

        let same = compare_embeddings(&a, &Embedding::new(vec![2.0, 0.0])).unwrap();
        assert!((same - 1.0).abs() < 1e-6);
    }
}
