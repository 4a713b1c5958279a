use anyhow::Result;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use burn_wgpu::{Wgpu, WgpuDevice};

use gesture_trainer_lib::ml::BurnBackend;
use gesture_trainer_lib::model::config::{DeviceType, PipelineConfig};
use gesture_trainer_lib::{GestureBackend, Pipeline, PipelineReport};

fn run<Bk: GestureBackend>(config: PipelineConfig, backend: Bk) -> Result<PipelineReport> {
    Pipeline::new(config, backend).run()
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .filter_module("wgpu_hal", log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = PipelineConfig::load_or_default();
    config.validate()?;
    config.display();

    let report = match config.device_type {
        DeviceType::Wgpu => {
            let backend =
                BurnBackend::<Autodiff<Wgpu>>::new(WgpuDevice::default(), &config.export);
            run(config, backend)?
        }
        DeviceType::Cpu => {
            let backend = BurnBackend::<Autodiff<NdArray>>::new(Default::default(), &config.export);
            run(config, backend)?
        }
    };

    log::info!(
        "完了: 学習 {} / 検証 {} / テスト {} 件, 出力 {}",
        report.split_sizes.0,
        report.split_sizes.1,
        report.split_sizes.2,
        report.exported_path.display()
    );
    Ok(())
}
