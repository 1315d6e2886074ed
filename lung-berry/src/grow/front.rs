//! 多源竞争生长的推进前沿.
//!
//! 本质是多源 Dijkstra: 每个可用体素最终归属到达代价最小的种子集合,
//! 代价相同时归属序号较小的集合.

use binary_heap_plus::{BinaryHeap, MinComparator};
use ndarray::Array3;
use ordered_float::OrderedFloat;

use super::GrowthParams;
use crate::consts::label::BACKGROUND;
use crate::data::{diamond_neighbours, GridAttr, MaskGrid, VoxelGrid};
use crate::Idx3d;

/// 集合序号的哨兵值, 代表尚未被任何集合到达.
const UNOWNED: u8 = u8::MAX;

/// 可容纳的最大集合个数.
pub const MAX_RANKS: usize = UNOWNED as usize;

/// 堆元素: (累计代价, 集合序号, 体素).
///
/// 元组按字典序比较, 因此同代价时集合序号小者先出堆.
type Entry = (OrderedFloat<f32>, u8, Idx3d);

/// 竞争生长所需要维护的数据结构集合.
///
/// 每个体素只保存 `f32` 代价与 `u8` 集合序号. 出堆时代价与序号均与记录一致的元素
/// 即为该体素的最终归属, 无需额外的已确定标记.
pub struct GrowthFront<'a> {
    scan: &'a VoxelGrid,
    admissible: &'a MaskGrid,
    params: &'a GrowthParams,
    cost: Array3<f32>,
    owner: Array3<u8>,
    heap: BinaryHeap<Entry, MinComparator>,
}

impl<'a> GrowthFront<'a> {
    /// 创建空前沿. 调用者保证 `scan` 与 `admissible` 形状一致.
    pub fn new(scan: &'a VoxelGrid, admissible: &'a MaskGrid, params: &'a GrowthParams) -> Self {
        let shape = scan.shape();
        debug_assert_eq!(shape, admissible.shape());
        Self {
            scan,
            admissible,
            params,
            cost: Array3::from_elem(shape, f32::INFINITY),
            owner: Array3::from_elem(shape, UNOWNED),
            heap: BinaryHeap::new_min(),
        }
    }

    /// 以代价 0 将 `pos` 作为集合 `rank` 的种子体素. 先播种的集合优先.
    ///
    /// `rank` 须小于 [`MAX_RANKS`].
    pub fn seed(&mut self, rank: u8, pos: Idx3d) {
        debug_assert!(self.admissible[pos]);
        debug_assert!(rank != UNOWNED);
        if self.offer(rank, pos, 0.0) {
            self.heap.push((OrderedFloat(0.0), rank, pos));
        }
    }

    /// 若 `(cost, rank)` 按字典序优于 `pos` 当前的记录, 则更新并返回 `true`.
    #[inline]
    fn offer(&mut self, rank: u8, pos: Idx3d, cost: f32) -> bool {
        let better = cost < self.cost[pos] || (cost == self.cost[pos] && rank < self.owner[pos]);
        if better {
            self.cost[pos] = cost;
            self.owner[pos] = rank;
        }
        better
    }

    /// 相邻体素 `from -> to` 之间的边代价.
    ///
    /// 代价为步长 (毫米) 乘以 `1 + |ΔHU| / intensity_scale`. 非有限 HU 值不引入额外代价.
    #[inline]
    fn edge_cost(&self, from: Idx3d, to: Idx3d) -> f32 {
        let pix_dim = self.scan.pix_dim();
        let step = if from.0 != to.0 {
            pix_dim[0]
        } else if from.1 != to.1 {
            pix_dim[1]
        } else {
            pix_dim[2]
        };
        let diff = (self.scan[to] as f64 - self.scan[from] as f64).abs();
        let diff = if diff.is_finite() { diff } else { 0.0 };
        (step * (1.0 + diff / self.params.intensity_scale)) as f32
    }

    /// 推进前沿直到无法继续. 返回被归属的体素个数.
    pub fn run(&mut self) -> usize {
        let shape = self.scan.shape();
        let mut settled_count = 0;

        while let Some((OrderedFloat(cost), rank, pos)) = self.heap.pop() {
            // 过期元素. 已确定的体素不会再被更优的 (代价, 序号) 覆盖,
            // 因此它的最终元素恰好出堆一次.
            if cost != self.cost[pos] || rank != self.owner[pos] {
                continue;
            }
            settled_count += 1;

            for neigh in diamond_neighbours(shape, pos) {
                if !self.admissible[neigh] {
                    continue;
                }
                let next = cost + self.edge_cost(pos, neigh);
                if self.offer(rank, neigh, next) {
                    self.heap.push((OrderedFloat(next), rank, neigh));
                }
            }
        }
        settled_count
    }

    /// [`run`](Self::run) 之后体素 `pos` 的归属集合序号. 未被到达时返回 `None`.
    #[inline]
    pub fn owner_of(&self, pos: Idx3d) -> Option<u8> {
        let r = self.owner[pos];
        (r != UNOWNED).then_some(r)
    }

    /// 体素 `pos` 的到达代价. 未被到达时为正无穷.
    #[inline]
    pub fn cost_of(&self, pos: Idx3d) -> f32 {
        self.cost[pos]
    }

    /// 消费自身, 将集合序号 `r` 写为 `labels[r]`, 未被到达的体素写为背景.
    pub fn into_labels(self, labels: &[u16]) -> Array3<u16> {
        let label = |r: u8| labels.get(usize::from(r)).copied().unwrap_or(BACKGROUND);
        self.owner.mapv(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_front_tie_breaks_by_rank() {
        // 1x1x5 的一行体素, 两端各一个种子, 正中间的体素两者同时到达.
        let scan = VoxelGrid::filled((1, 1, 5), [1.0; 3], -800.0).unwrap();
        let mask = MaskGrid::full(scan.geometry().clone());
        let params = GrowthParams::default();
        let mut front = GrowthFront::new(&scan, &mask, &params);
        front.seed(1, (0, 0, 0));
        front.seed(0, (0, 0, 4));
        assert_eq!(front.run(), 5);
        assert_eq!(front.owner_of((0, 0, 1)), Some(1));
        assert_eq!(front.owner_of((0, 0, 2)), Some(0));
        assert_eq!(front.owner_of((0, 0, 3)), Some(0));
        assert_eq!(front.cost_of((0, 0, 2)), 2.0);
    }

    #[test]
    fn test_growth_front_intensity_barrier() {
        // 无密度差时正中间的体素 3 同时被两侧到达, 归属左侧;
        // 体素 2 的高密度让左侧越过它的代价变高.
        let mut scan = VoxelGrid::filled((1, 1, 7), [1.0; 3], -800.0).unwrap();
        scan[(0, 0, 2)] = -400.0;
        let mask = MaskGrid::full(scan.geometry().clone());
        let params = GrowthParams::default();
        let mut front = GrowthFront::new(&scan, &mask, &params);
        front.seed(0, (0, 0, 0));
        front.seed(1, (0, 0, 6));
        assert_eq!(front.run(), 7);
        // 左侧: 0 -> 1 代价 1, 1 -> 2 代价 5.
        assert_eq!(front.cost_of((0, 0, 2)), 6.0);
        assert_eq!(front.owner_of((0, 0, 2)), Some(0));
        assert_eq!(front.owner_of((0, 0, 3)), Some(1));
        assert_eq!(front.cost_of((0, 0, 3)), 3.0);
    }

    #[test]
    fn test_growth_front_respects_mask() {
        let scan = VoxelGrid::filled((1, 1, 5), [1.0; 3], -800.0).unwrap();
        let mut mask = MaskGrid::full(scan.geometry().clone());
        mask[(0, 0, 2)] = false;
        let params = GrowthParams::default();
        let mut front = GrowthFront::new(&scan, &mask, &params);
        front.seed(0, (0, 0, 0));
        assert_eq!(front.run(), 2);
        assert_eq!(front.owner_of((0, 0, 4)), None);
        let labels = front.into_labels(&[7]);
        assert_eq!(labels[(0, 0, 1)], 7);
        assert_eq!(labels[(0, 0, 2)], BACKGROUND);
        assert_eq!(labels[(0, 0, 4)], BACKGROUND);
    }
}
