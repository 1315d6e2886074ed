//! 3D 标签网格.

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, Axis, Ix3, Zip};

use super::{GridAttr, GridGeometry, MaskGrid};
use crate::consts::label::is_background;
use crate::error::{LungError, LungResult};
use crate::Idx3d;

/// 3D 标签网格. 每个体素保存一个 `u16` 标签, `0` 代表背景.
///
/// 附带一份 "标签 -> 名称" 字典. 除背景外, 网格中出现的每个标签都必须在字典中.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelGrid {
    geometry: GridGeometry,
    data: Array3<u16>,
    names: BTreeMap<u16, String>,
}

impl GridAttr for LabelGrid {
    #[inline]
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }
}

impl Index<Idx3d> for LabelGrid {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelGrid {
    /// 直接改写体素标签. 调用者需保证写入的标签已通过
    /// [`LabelGrid::insert_name`] 登记.
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl LabelGrid {
    /// 创建与 `geometry` 匹配的全背景标签网格, 字典为空.
    #[inline]
    pub fn background(geometry: GridGeometry) -> Self {
        let data = Array3::zeros(geometry.shape());
        Self {
            geometry,
            data,
            names: BTreeMap::new(),
        }
    }

    /// 由已有的 `(z, h, w)` 数组, 几何信息和标签字典构造.
    ///
    /// # 返回值
    ///
    /// - 若数组与几何信息形状不一致, 返回 `Err(LungError::ShapeMismatch)`;
    /// - 若存在未登记在字典中的非背景标签, 返回 `Err(LungError::UnknownLabel)`;
    /// - 其他情况下成功.
    pub fn from_parts(
        data: Array3<u16>,
        geometry: GridGeometry,
        names: BTreeMap<u16, String>,
    ) -> LungResult<Self> {
        let found = data.dim();
        if found != geometry.shape() {
            return Err(LungError::ShapeMismatch {
                what: "label data",
                expected: geometry.shape(),
                found,
            });
        }
        let ans = Self {
            geometry,
            data,
            names,
        };
        if let Some(l) = ans.first_unnamed_label() {
            return Err(LungError::UnknownLabel(l));
        }
        Ok(ans)
    }

    /// crate 内部构造, 由调用者保证形状一致且所有标签均已登记.
    #[inline]
    pub(crate) fn from_parts_unchecked(
        data: Array3<u16>,
        geometry: GridGeometry,
        names: BTreeMap<u16, String>,
    ) -> Self {
        debug_assert_eq!(data.dim(), geometry.shape());
        Self {
            geometry,
            data,
            names,
        }
    }

    /// 登记标签名称. 若该标签已存在, 覆盖原名称.
    ///
    /// 背景标签不可登记, 调用会被忽略.
    pub fn insert_name(&mut self, label: u16, name: impl Into<String>) {
        if !is_background(label) {
            self.names.insert(label, name.into());
        }
    }

    /// 获取标签名称.
    #[inline]
    pub fn name(&self, label: u16) -> Option<&str> {
        self.names.get(&label).map(String::as_str)
    }

    /// 获取标签字典.
    #[inline]
    pub fn names(&self) -> &BTreeMap<u16, String> {
        &self.names
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u16, Ix3> {
        self.data.view()
    }

    /// 获取值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u16) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 是否为全背景?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 网格中出现的最大标签值.
    #[inline]
    pub fn max_label(&self) -> u16 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// 标签直方图: 第 `l` 个元素是值为 `l` 的体素个数. 长度为 `self.max_label() + 1`.
    pub fn histogram(&self) -> Vec<u64> {
        let mut ans = vec![0u64; self.max_label() as usize + 1];
        for sli in self.data.axis_iter(Axis(0)) {
            slice_histogram_into(sli.iter().copied(), &mut ans);
        }
        ans
    }

    /// 仅统计 `region` 为前景的体素的标签直方图.
    ///
    /// 若 `region` 形状与自身不一致, 返回 `Err(LungError::ShapeMismatch)`.
    pub fn histogram_within(&self, region: &MaskGrid) -> LungResult<Vec<u64>> {
        self.ensure_same_shape(region, "histogram region")?;
        let mut ans = vec![0u64; self.max_label() as usize + 1];
        Zip::from(&self.data)
            .and(region.data())
            .for_each(|&l, &inside| {
                if inside {
                    ans[l as usize] += 1;
                }
            });
        Ok(ans)
    }

    /// 值满足谓词 `pred` 的体素组成的掩码.
    pub fn mask_where(&self, pred: impl Fn(u16) -> bool) -> MaskGrid {
        MaskGrid::from_parts(self.data.mapv(pred), self.geometry.clone())
    }

    /// 值为 `label` 的体素组成的掩码.
    #[inline]
    pub fn mask_of(&self, label: u16) -> MaskGrid {
        self.mask_where(|l| l == label)
    }

    /// 将 `region` 中的所有体素标记为 `label`, 并登记名称 `name`.
    ///
    /// 若形状不一致, 返回 `Err(LungError::ShapeMismatch)`, 自身不被修改.
    pub fn paint(
        &mut self,
        region: &MaskGrid,
        label: u16,
        name: impl Into<String>,
    ) -> LungResult<()> {
        self.ensure_same_shape(region, "painted region")?;
        Zip::from(&mut self.data)
            .and(region.data())
            .for_each(|l, &inside| {
                if inside {
                    *l = label;
                }
            });
        self.insert_name(label, name);
        Ok(())
    }

    /// 将 `other` 中的非背景体素合并进自身, 同时合并标签字典.
    ///
    /// 两者的非背景区域应当互不相交; 若相交, 以 `other` 为准.
    /// 若形状不一致, 返回 `Err(LungError::ShapeMismatch)`, 自身不被修改.
    pub fn merge_disjoint(&mut self, other: &LabelGrid) -> LungResult<()> {
        self.ensure_same_shape(other, "merged label grid")?;
        Zip::from(&mut self.data).and(&other.data).for_each(|a, &b| {
            if !is_background(b) {
                debug_assert!(is_background(*a) || *a == b);
                *a = b;
            }
        });
        self.names
            .extend(other.names.iter().map(|(k, v)| (*k, v.clone())));
        Ok(())
    }

    /// 网格中第一个 (按值升序) 未登记名称的非背景标签.
    fn first_unnamed_label(&self) -> Option<u16> {
        self.histogram()
            .iter()
            .enumerate()
            .skip(1)
            .find(|(l, c)| **c != 0 && !self.names.contains_key(&(*l as u16)))
            .map(|(l, _)| l as u16)
    }

    /// 消费自身, 获得底层数据.
    #[inline]
    pub fn into_raw(self) -> (GridGeometry, Array3<u16>, BTreeMap<u16, String>) {
        (self.geometry, self.data, self.names)
    }
}

/// 将一个切片的标签计入 `hist`. `hist` 的长度必须大于切片中的最大标签.
#[inline]
fn slice_histogram_into<I: Iterator<Item = u16>>(it: I, hist: &mut [u64]) {
    for l in it {
        hist[l as usize] += 1;
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl LabelGrid {
    /// 借助 `rayon`, 按水平切片并行地计算 [`Self::histogram`].
    pub fn par_histogram(&self) -> Vec<u64> {
        let len = self.max_label() as usize + 1;
        self.data
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|sli| {
                let mut local = vec![0u64; len];
                slice_histogram_into(sli.iter().copied(), &mut local);
                local
            })
            .reduce(
                || vec![0u64; len],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    a
                },
            )
    }
}
