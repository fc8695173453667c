//! 手势分类器
//!
//! 输入为单只手的 21 个二维关键点（MediaPipe Hands 编号，图像坐标，
//! y 轴向下），输出一个 [`Gesture`]。纯函数，无状态。
//!
//! 规则：
//! - 两指：食指、中指指尖高于各自 PIP 关节，无名指、小指指尖低于各自 PIP
//! - 握拳：四个指尖全部低于手腕
//! - 张掌：四个指尖全部高于手腕

use super::Gesture;

/// MediaPipe Hands 关键点数量
pub const LANDMARK_COUNT: usize = 21;

const WRIST: usize = 0;
const INDEX_PIP: usize = 6;
const INDEX_TIP: usize = 8;
const MIDDLE_PIP: usize = 10;
const MIDDLE_TIP: usize = 12;
const RING_PIP: usize = 14;
const RING_TIP: usize = 16;
const PINKY_PIP: usize = 18;
const PINKY_TIP: usize = 20;

const FINGER_TIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// 单只手的关键点集合
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    points: [(f32, f32); LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [(f32, f32); LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// 从切片构造，长度不是 21 时返回 `None`
    pub fn from_points(points: &[(f32, f32)]) -> Option<Self> {
        let points: [(f32, f32); LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    fn y(&self, idx: usize) -> f32 {
        self.points[idx].1
    }

    fn above(&self, a: usize, b: usize) -> bool {
        self.y(a) < self.y(b)
    }
}

/// 对一帧中的一只手进行分类
pub fn classify(hand: &HandLandmarks) -> Gesture {
    let two_fingers = hand.above(INDEX_TIP, INDEX_PIP)
        && hand.above(MIDDLE_TIP, MIDDLE_PIP)
        && hand.above(RING_PIP, RING_TIP)
        && hand.above(PINKY_PIP, PINKY_TIP);
    if two_fingers {
        return Gesture::TwoFingers;
    }

    if FINGER_TIPS.iter().all(|&tip| hand.above(WRIST, tip)) {
        return Gesture::Fist;
    }

    if FINGER_TIPS.iter().all(|&tip| hand.above(tip, WRIST)) {
        return Gesture::OpenPalm;
    }

    Gesture::None
}

/// 对一帧分类；无手时为 `Gesture::None`
pub fn classify_frame(hand: Option<&HandLandmarks>) -> Gesture {
    hand.map_or(Gesture::None, classify)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 手腕在 y=0.9；每根手指给出 (PIP y, TIP y)
    fn hand(index: (f32, f32), middle: (f32, f32), ring: (f32, f32), pinky: (f32, f32)) -> HandLandmarks {
        let mut points = [(0.5, 0.6); LANDMARK_COUNT];
        points[WRIST] = (0.5, 0.9);
        for (pip, tip, (pip_y, tip_y)) in [
            (INDEX_PIP, INDEX_TIP, index),
            (MIDDLE_PIP, MIDDLE_TIP, middle),
            (RING_PIP, RING_TIP, ring),
            (PINKY_PIP, PINKY_TIP, pinky),
        ] {
            points[pip] = (0.5, pip_y);
            points[tip] = (0.5, tip_y);
        }
        HandLandmarks::new(points)
    }

    #[test]
    fn test_two_fingers() {
        let h = hand((0.5, 0.3), (0.5, 0.3), (0.6, 0.7), (0.6, 0.7));
        assert_eq!(classify(&h), Gesture::TwoFingers);
    }

    #[test]
    fn test_open_palm() {
        let h = hand((0.5, 0.3), (0.5, 0.3), (0.5, 0.3), (0.5, 0.3));
        assert_eq!(classify(&h), Gesture::OpenPalm);
    }

    #[test]
    fn test_fist() {
        // 手倒置：指尖全部低于手腕
        let mut h = hand((0.95, 0.97), (0.95, 0.97), (0.95, 0.92), (0.95, 0.92));
        h.points[WRIST] = (0.5, 0.8);
        assert_eq!(classify(&h), Gesture::Fist);
    }

    #[test]
    fn test_ambiguous_is_none() {
        // 指尖跨越手腕两侧
        let h = hand((0.5, 0.3), (0.9, 0.95), (0.5, 0.3), (0.9, 0.95));
        assert_eq!(classify(&h), Gesture::None);
        assert_eq!(classify_frame(None), Gesture::None);
    }

    #[test]
    fn test_from_points_length() {
        assert!(HandLandmarks::from_points(&[(0.0, 0.0); 5]).is_none());
        assert!(HandLandmarks::from_points(&[(0.0, 0.0); LANDMARK_COUNT]).is_some());
    }
}
