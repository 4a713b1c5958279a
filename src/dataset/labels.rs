//! ラベルの検出とクラスIDの割り当て
//!
//! ラベルはデータセットルート直下のサブディレクトリ名です。
//! `LabelMap` がクラス所属の唯一の情報源になります。

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::error::DatasetError;

/// ジェスチャ無しを表すラベル（大文字小文字は区別しない）
pub const NONE_LABEL: &str = "none";

/// データセットルート直下のサブディレクトリ名を列挙する
///
/// 名前順にソートして返します。ファイルは対象外です。
pub fn list_labels(dataset_dir: &Path) -> Result<Vec<String>> {
    if !dataset_dir.is_dir() {
        return Err(DatasetError::MissingDirectory(dataset_dir.to_path_buf()).into());
    }

    let mut labels = Vec::new();
    for entry in std::fs::read_dir(dataset_dir)
        .with_context(|| format!("Failed to read {}", dataset_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|n| anyhow::anyhow!("Invalid directory name: {:?}", n))?;
        labels.push(name);
    }
    labels.sort();
    Ok(labels)
}

/// ディレクトリ名 → クラスID の対応表
///
/// ラベルは名前順に並べた上で "none" を先頭（クラスID 0）に移動します。
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelMap {
    /// ラベル一覧から対応表を作成する
    pub fn new(mut labels: Vec<String>) -> Result<Self, DatasetError> {
        labels.sort();
        labels.dedup();

        let none_pos = labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(NONE_LABEL))
            .ok_or_else(|| DatasetError::MissingNoneLabel {
                labels: labels.clone(),
            })?;
        let none = labels.remove(none_pos);
        labels.insert(0, none);

        let index = labels
            .iter()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();
        Ok(Self { labels, index })
    }

    /// データセットルートのサブディレクトリから対応表を作成する
    pub fn from_directory(dataset_dir: &Path) -> Result<Self> {
        let labels = list_labels(dataset_dir)?;
        if labels.is_empty() {
            return Err(DatasetError::NoLabels(dataset_dir.to_path_buf()).into());
        }
        Ok(Self::new(labels)?)
    }

    pub fn class_id(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    /// クラスID順のラベル
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_labels_matches_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["thumbs_up", "thumbs_down", "none", ".ipynb_checkpoints"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("README.txt"), "not a label").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), "junk").unwrap();

        let labels = list_labels(dir.path()).unwrap();
        assert_eq!(labels, vec![".ipynb_checkpoints", "none", "thumbs_down", "thumbs_up"]);
    }

    #[test]
    fn test_list_labels_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_labels(&dir.path().join("dataset")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_none_label_is_first() {
        let map = LabelMap::new(vec![
            "rock".into(),
            "None".into(),
            "call".into(),
            "rock".into(),
        ])
        .unwrap();
        assert_eq!(map.labels(), &["None", "call", "rock"]);
        assert_eq!(map.class_id("None"), Some(0));
        assert_eq!(map.class_id("rock"), Some(2));
        assert_eq!(map.label(1), Some("call"));
        assert_eq!(map.label(3), None);
    }

    #[test]
    fn test_missing_none_label_rejected() {
        let err = LabelMap::new(vec!["fist".into(), "palm".into()]).unwrap_err();
        assert!(matches!(err, DatasetError::MissingNoneLabel { .. }));
    }

    #[test]
    fn test_empty_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = LabelMap::from_directory(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::NoLabels(_))
        ));
    }
}
