//! 内存类型属性
//!
//! 使用 MAIR 编码，并实现第一阶段与第二阶段属性的合并规则。

/// 一次转换的可缓存性（MAIR 字节）与共享性（SH 字段）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheAttrs {
    /// 外部属性在 7:4 位，内部属性在 3:0 位；高半字节为 0 表示 Device。
    pub attrs: u8,
    /// 0 不共享，2 外部共享，3 内部共享。
    pub shareability: u8,
}

impl CacheAttrs {
    /// Device-nGnRnE，关闭转换时所有访问的类型。
    pub const DEVICE_NGNRNE: CacheAttrs = CacheAttrs { attrs: 0x00, shareability: 2 };
    /// Normal 内/外写回，读写分配。
    pub const NORMAL_WB: CacheAttrs = CacheAttrs { attrs: 0xff, shareability: 0 };

    pub fn is_device(&self) -> bool {
        self.attrs & 0xf0 == 0
    }
}

/// 把第二阶段 MemAttr[3:0] 字段转换为 MAIR 格式。
pub fn convert_stage2_attrs(s2attrs: u8) -> u8 {
    let hiattr = (s2attrs >> 2) & 3;
    let loattr = s2attrs & 3;
    let mut hihint = 0;
    let mut lohint = 0;

    if hiattr != 0 {
        // 不可缓存保持提示 0；WT/WB 均为读写分配。
        if hiattr != 1 {
            hihint = 3;
        }
        if loattr != 1 {
            lohint = 3;
        }
    } else {
        // Device：MemAttr[1:0] 选择设备类型。
        return loattr << 2;
    }
    (hiattr << 6) | (hihint << 4) | (loattr << 2) | lohint
}

/// 合并第一阶段与第二阶段的一个可缓存性半字节。
fn combine_nibble(s1: u8, s2: u8) -> u8 {
    if s1 == 4 || s2 == 4 {
        // 不可缓存优先。
        4
    } else if (s1 >> 2) & 3 == 0 || (s1 >> 2) & 3 == 2 {
        // 第一阶段写通。
        s1
    } else if (s2 >> 2) & 3 == 2 {
        // 第二阶段写通；分配提示仍取自第一阶段。
        (2 << 2) | (s1 & 3)
    } else {
        s1
    }
}

/// 合并两阶段转换的第一阶段与第二阶段属性。
pub fn combine_cacheattrs(s1: CacheAttrs, s2: CacheAttrs) -> CacheAttrs {
    let s1lo = s1.attrs & 0xf;
    let s2lo = s2.attrs & 0xf;
    let s1hi = s1.attrs >> 4;
    let s2hi = s2.attrs >> 4;

    // 取两者中共享范围更大的。
    let shareability = if s1.shareability == 2 || s2.shareability == 2 {
        2
    } else if s1.shareability == 3 || s2.shareability == 3 {
        3
    } else {
        0
    };

    let attrs = if s1hi == 0 || s2hi == 0 {
        // Device 优先；两种设备类型之间取更强（更小）的。
        match (s1hi == 0, s2hi == 0) {
            (true, true) => s1lo.min(s2lo),
            (true, false) => s1lo,
            _ => s2lo,
        }
    } else {
        (combine_nibble(s1hi, s2hi) << 4) | combine_nibble(s1lo, s2lo)
    };

    // Device 或完全不可缓存的 Normal 内存视为外部共享。
    let shareability = if attrs & 0xf0 == 0 || attrs == 0x44 {
        2
    } else {
        shareability
    };
    CacheAttrs { attrs, shareability }
}

/// 短描述符 TEX/C/B 编码对应的 MAIR 格式属性
/// （TEX 重映射关闭）。
pub fn short_desc_attrs(tex: u32, c: bool, b: bool, shareable: bool) -> CacheAttrs {
    let attrs = match (tex & 7, c, b) {
        (0, false, false) => 0x00,
        (0, false, true) | (2, false, false) => 0x04,
        (0, true, false) => 0xaa,
        (0, true, true) => 0xee,
        (1, false, false) => 0x44,
        (1, true, true) => 0xff,
        (t, _, _) if t & 4 != 0 => {
            // 可缓存内存：TEX[1:0] 为外部，C:B 为内部。
            let policy = |v: u32| match v & 3 {
                0 => 0x4u8,
                1 => 0xf,
                2 => 0xa,
                _ => 0xe,
            };
            (policy(t) << 4) | policy(((c as u32) << 1) | b as u32)
        }
        _ => 0x44,
    };
    CacheAttrs {
        attrs,
        shareability: if attrs & 0xf0 == 0 || shareable { 2 } else { 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_dominates() {
        let s1 = CacheAttrs { attrs: 0xff, shareability: 3 };
        let s2 = CacheAttrs { attrs: 0x04, shareability: 0 };
        let c = combine_cacheattrs(s1, s2);
        assert_eq!(c.attrs, 0x04);
        assert!(c.is_device());
        assert_eq!(c.shareability, 2);
    }

    #[test]
    fn test_noncacheable_dominates() {
        let s1 = CacheAttrs { attrs: 0xff, shareability: 3 };
        let s2 = CacheAttrs { attrs: 0x44, shareability: 3 };
        assert_eq!(combine_cacheattrs(s1, s2).attrs, 0x44);
    }

    #[test]
    fn test_s2_write_through_keeps_s1_hint() {
        // s1：写回，仅读分配 (0xd)；s2：写通 (0xb)
        let s1 = CacheAttrs { attrs: 0xdd, shareability: 3 };
        let s2 = CacheAttrs { attrs: 0xbb, shareability: 3 };
        let c = combine_cacheattrs(s1, s2);
        assert_eq!(c.attrs, 0x99);
        assert_eq!(c.shareability, 3);
    }

    #[test]
    fn test_convert_stage2() {
        assert_eq!(convert_stage2_attrs(0xf), 0xff);
        assert_eq!(convert_stage2_attrs(0x5), 0x44);
        assert_eq!(convert_stage2_attrs(0x1), 0x04);
    }

    #[test]
    fn test_short_desc_attrs() {
        assert!(short_desc_attrs(0, false, false, false).is_device());
        assert_eq!(short_desc_attrs(1, true, true, true).attrs, 0xff);
        assert_eq!(short_desc_attrs(0b101, false, true, false).attrs, 0xff);
    }
}
