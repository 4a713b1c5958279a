//! エクスポート済みモデルの確認用バイナリ
//!
//! 使い方: inspect_model [モデルパス] [画像...]

use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use gesture_trainer_lib::ml::GestureRecognizer;
use gesture_trainer_lib::model::{load_metadata, print_metadata_info};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    println!("=== Gesture Model Inspector ===\n");

    let args: Vec<String> = std::env::args().collect();
    let model_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("exported_model/gesture_recognizer.task")
    };
    let images: Vec<PathBuf> = args.iter().skip(2).map(PathBuf::from).collect();

    println!("Test 1: モデルメタデータ読み込み");
    let metadata = load_metadata(&model_path)
        .with_context(|| format!("メタデータを読み込めません: {}", model_path.display()))?;
    println!("✓ モデルメタデータ読み込み成功:");
    print_metadata_info(&metadata);

    if images.is_empty() {
        return Ok(());
    }

    println!("\n{}\n", "=".repeat(50));

    println!("Test 2: 画像分類");
    classify(&model_path, &images)
}

fn classify(model_path: &Path, images: &[PathBuf]) -> Result<()> {
    let recognizer = GestureRecognizer::<NdArray>::load(model_path, &Default::default())
        .with_context(|| format!("モデルを読み込めません: {}", model_path.display()))?;

    for image in images {
        let prediction = recognizer
            .classify_image(image)
            .with_context(|| format!("分類に失敗しました: {}", image.display()))?;
        println!(
            "  {} → {} (class {}, {:.1}%)",
            image.display(),
            prediction.label,
            prediction.class_id,
            prediction.score * 100.0
        );
    }
    Ok(())
}
