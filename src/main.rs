//! guided_saliency 命令行程序：对配置中的每个样本运行导向反向传播并导出显著图

use anyhow::{Context, Result};
use clap::Parser;
use guided_saliency::config::AppConfig;
use guided_saliency::data::load_example;
use guided_saliency::nn::build_resnet;
use guided_saliency::visualization::run_guided_backprop;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "guided_saliency")]
#[command(author, version)]
#[command(about = "Guided backpropagation saliency maps for a CNN classifier")]
struct Cli {
    /// JSON 配置文件；不指定时使用默认配置
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 覆盖配置中的输出目录
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// 只处理指定下标的样本，如 `--examples 0,2,4`
    #[arg(long, value_delimiter = ',', value_name = "INDICES")]
    examples: Option<Vec<usize>>,

    /// 覆盖配置中的预训练参数文件
    #[arg(long, value_name = "FILE")]
    weights: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if let Some(weights) = cli.weights {
        config.weights = Some(weights);
    }
    config.validate().context("Invalid configuration")?;

    let examples = match &cli.examples {
        Some(indices) => config.select_examples(indices)?,
        None => config.examples.clone(),
    };

    let mut model = build_resnet(&config.model, config.preprocess.image_size)
        .context("Failed to build model")?;
    match &config.weights {
        Some(path) => {
            let loaded = model
                .load_params(path)
                .with_context(|| format!("Failed to load weights {}", path.display()))?;
            info!("从{}载入了{}个参数", path.display(), loaded);
        }
        None => tracing::warn!("未指定预训练参数，使用随机初始化的模型"),
    }

    for (i, example_config) in examples.iter().enumerate() {
        let example = load_example(example_config, &config.preprocess)
            .with_context(|| format!("Failed to load example {}", example_config.path.display()))?;
        let paths = run_guided_backprop(&model, &example, &config.output_dir, config.image_format)
            .with_context(|| format!("Guided backprop failed for {}", example.export_name))?;
        for path in &paths {
            info!("已写入{}", path.display());
        }
        println!("Guided backprop completed for {i}");
    }

    Ok(())
}
