//! データセットの分割

use crate::dataset::loader::GestureDataset;
use crate::error::DatasetError;

// 0.8 * 10 = 7.999... のような丸め誤差を吸収する
const FRACTION_EPSILON: f64 = 1e-9;

/// `fraction` 側に入るサンプル数（切り捨て）
pub fn split_point(len: usize, fraction: f64) -> Result<usize, DatasetError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(DatasetError::InvalidFraction(fraction));
    }
    let point = (len as f64 * fraction + FRACTION_EPSILON).floor() as usize;
    Ok(point.min(len))
}

impl GestureDataset {
    /// データセットを2つに分割する
    ///
    /// 格納順の先頭 `floor(fraction * len)` 件が1つ目、残りが2つ目になります。
    /// 順序のランダム化は読み込み時のシャッフルで行うため、分割自体は決定的です。
    /// 2つのサブセットは互いに素で、和集合は元のデータセットに一致します。
    pub fn split(&self, fraction: f64) -> Result<(Self, Self), DatasetError> {
        let point = split_point(self.len(), fraction)?;
        Ok((self.subset(0..point), self.subset(point..self.len())))
    }
}

/// 学習・検証・テストの3分割
#[derive(Clone, Debug)]
pub struct DatasetSplits {
    pub train: GestureDataset,
    pub validation: GestureDataset,
    pub test: GestureDataset,
}

impl DatasetSplits {
    /// `train_fraction` で学習用を切り出し、残りを `validation_fraction` で検証用とテスト用に分ける
    pub fn new(
        dataset: &GestureDataset,
        train_fraction: f64,
        validation_fraction: f64,
    ) -> Result<Self, DatasetError> {
        let (train, rest) = dataset.split(train_fraction)?;
        let (validation, test) = rest.split(validation_fraction)?;
        log::info!(
            "分割: 学習 {} / 検証 {} / テスト {}",
            train.len(),
            validation.len(),
            test.len()
        );
        Ok(Self {
            train,
            validation,
            test,
        })
    }

    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.validation.len(), self.test.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::test_support::synthetic_dataset;
    use std::collections::HashSet;

    #[test]
    fn test_boundary_sizes() {
        for (n, expected) in [
            (0, (0, 0, 0)),
            (1, (0, 0, 1)),
            (2, (1, 0, 1)),
            (5, (4, 0, 1)),
            (10, (8, 1, 1)),
            (300, (240, 30, 30)),
        ] {
            let splits = DatasetSplits::new(&synthetic_dataset(n), 0.8, 0.5).unwrap();
            assert_eq!(splits.sizes(), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_subsets_are_disjoint_and_complete() {
        let dataset = synthetic_dataset(37);
        let splits = DatasetSplits::new(&dataset, 0.8, 0.5).unwrap();

        let train: HashSet<_> = splits.train.sample_ids().collect();
        let validation: HashSet<_> = splits.validation.sample_ids().collect();
        let test: HashSet<_> = splits.test.sample_ids().collect();

        assert!(train.is_disjoint(&validation));
        assert!(train.is_disjoint(&test));
        assert!(validation.is_disjoint(&test));

        let union: HashSet<_> = train.union(&validation).chain(test.iter()).copied().collect();
        let all: HashSet<_> = dataset.sample_ids().collect();
        assert_eq!(union, all);
    }

    #[test]
    fn test_nested_split_keeps_sample_contents() {
        let dataset = synthetic_dataset(10);
        let (_, rest) = dataset.split(0.8).unwrap();
        let (_, test) = rest.split(0.5).unwrap();

        assert_eq!(test.len(), 1);
        assert_eq!(test.sample(0).unwrap().path, dataset.sample(9).unwrap().path);
        assert!(test.sample(1).is_none());
    }

    #[test]
    fn test_extreme_fractions() {
        let dataset = synthetic_dataset(6);
        let (all, none) = dataset.split(1.0).unwrap();
        assert_eq!((all.len(), none.len()), (6, 0));
        let (none, all) = dataset.split(0.0).unwrap();
        assert_eq!((none.len(), all.len()), (0, 6));
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let dataset = synthetic_dataset(4);
        assert!(matches!(
            dataset.split(1.2),
            Err(DatasetError::InvalidFraction(_))
        ));
        assert!(matches!(
            dataset.split(-0.1),
            Err(DatasetError::InvalidFraction(_))
        ));
        assert!(dataset.split(f64::NAN).is_err());
    }
}
