//! Arbitrary-width integer value used for CHP/HSE variables, channel
//! payloads, and PRS timing constants.
//!
//! Values are stored as a little-endian vector of 64-bit limbs. The
//! invariant maintained by every constructor and every arithmetic op in
//! this module is: `limbs.len() == ceil(width / 64)` and all bits above
//! `width` in the top limb are zero.

use std::cmp::Ordering;
use std::fmt;
use smallvec::SmallVec;

pub type Limb = u64;
const LIMB_BITS: u32 = 64;

/// Errors raised by width-changing or width-checked operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum WideIntError {
    /// A width of zero was requested; every wide integer needs at least one bit.
    #[display(fmt = "wide integer width must be at least 1 bit")]
    ZeroWidth,
    /// An assignment target is narrower than the value's significant bits.
    #[display(
        fmt = "value needs {value_bits} bits but the assignment target is only {target_width} bits wide"
    )]
    WidthMismatch { target_width: u32, value_bits: u32 },
    /// Division or modulo by a value that is entirely zero.
    #[display(fmt = "division or modulo by zero")]
    DivisionByZero,
}

impl std::error::Error for WideIntError {}

fn limb_count(width: u32) -> usize {
    ((width as usize) + (LIMB_BITS as usize - 1)) / LIMB_BITS as usize
}

/// An immutable-by-value arbitrary-width integer with explicit width
/// tracking and an "unknown" (`X`) state mirroring the tri-state [`Bit`](crate::Bit)
/// used for single-wire values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideInt {
    width: u32,
    signed: bool,
    known: bool,
    limbs: SmallVec<[Limb; 2]>,
}

impl WideInt {
    /// A fully unknown (`X`) value of the given width.
    pub fn unknown(width: u32) -> Result<Self, WideIntError> {
        if width == 0 {
            return Err(WideIntError::ZeroWidth);
        }
        Ok(Self {
            width,
            signed: false,
            known: false,
            limbs: SmallVec::from_elem(0, limb_count(width)),
        })
    }

    /// A known value of zero at the given width.
    pub fn zero(width: u32) -> Result<Self, WideIntError> {
        Self::from_u64(width, 0)
    }

    /// A known value constructed from a native `u64`, zero-extended (or
    /// truncated by masking) to `width` bits.
    pub fn from_u64(width: u32, value: u64) -> Result<Self, WideIntError> {
        if width == 0 {
            return Err(WideIntError::ZeroWidth);
        }
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, limb_count(width));
        limbs[0] = value;
        let mut v = Self {
            width,
            signed: false,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn is_known(&self) -> bool {
        self.known
    }

    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn limbs(&self) -> &[Limb] {
        &self.limbs
    }

    /// Flip the signed/unsigned interpretation used by comparisons and
    /// arithmetic-shift-right. Storage is unaffected.
    pub fn to_signed(&self) -> Self {
        let mut v = self.clone();
        v.signed = true;
        v
    }

    pub fn to_unsigned(&self) -> Self {
        let mut v = self.clone();
        v.signed = false;
        v
    }

    fn mask_top_limb(&mut self) {
        let bits_in_top = self.width % LIMB_BITS;
        if bits_in_top != 0 {
            let mask = (1u64 << bits_in_top) - 1;
            if let Some(top) = self.limbs.last_mut() {
                *top &= mask;
            }
        }
    }

    fn get_bit(&self, i: u32) -> bool {
        if i >= self.width {
            return false;
        }
        let limb = i / LIMB_BITS;
        let off = i % LIMB_BITS;
        (self.limbs[limb as usize] >> off) & 1 == 1
    }

    /// The highest set-bit position plus one; zero for an all-zero value.
    /// Used to detect lossy narrowing on assignment.
    pub fn significant_bits(&self) -> u32 {
        for i in (0..self.width).rev() {
            if self.get_bit(i) {
                return i + 1;
            }
        }
        0
    }

    /// Whether the value, interpreted under its current sign discipline, is
    /// negative (i.e. the top bit is set and the value is signed).
    pub fn is_negative(&self) -> bool {
        self.signed && self.get_bit(self.width - 1)
    }

    /// Extends with zeros or truncates by masking the top limb. A width of
    /// zero is illegal.
    pub fn set_width(&self, new_width: u32) -> Result<Self, WideIntError> {
        if new_width == 0 {
            return Err(WideIntError::ZeroWidth);
        }
        let mut limbs = self.limbs.clone();
        limbs.resize(limb_count(new_width), 0);
        let mut v = Self {
            width: new_width,
            signed: self.signed,
            known: self.known,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    /// Like [`set_width`](Self::set_width), but also reports whether the
    /// narrowing was lossy (dropped significant bits) so callers can raise
    /// the width-mismatch warning described in the spec while still storing
    /// the truncated value.
    pub fn set_width_checked(&self, new_width: u32) -> Result<(Self, bool), WideIntError> {
        let lossy = self.known && new_width < self.significant_bits();
        let v = self.set_width(new_width)?;
        Ok((v, lossy))
    }

    fn binary_width_rule(a: &Self, b: &Self) -> u32 {
        a.width.max(b.width)
    }

    fn propagate_unknown(a: &Self, b: &Self, width: u32) -> Option<Self> {
        if !a.known || !b.known {
            Self::unknown(width).ok()
        } else {
            None
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self, WideIntError> {
        let width = Self::binary_width_rule(self, other);
        if let Some(x) = Self::propagate_unknown(self, other, width) {
            return Ok(x);
        }
        let a = self.set_width(width)?;
        let b = other.set_width(width)?;
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, limb_count(width));
        let mut carry = 0u128;
        for i in 0..limbs.len() {
            let sum = a.limbs[i] as u128 + b.limbs[i] as u128 + carry;
            limbs[i] = sum as u64;
            carry = sum >> 64;
        }
        let mut v = Self {
            width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    fn negate_limbs(width: u32, limbs: &[Limb]) -> SmallVec<[Limb; 2]> {
        let mut out: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, limbs.len());
        let mut carry = 1u128;
        for i in 0..limbs.len() {
            let inv = (!limbs[i]) as u128;
            let sum = inv + carry;
            out[i] = sum as u64;
            carry = sum >> 64;
        }
        let bits_in_top = width % LIMB_BITS;
        if bits_in_top != 0 {
            if let Some(top) = out.last_mut() {
                *top &= (1u64 << bits_in_top) - 1;
            }
        }
        out
    }

    pub fn sub(&self, other: &Self) -> Result<Self, WideIntError> {
        let width = Self::binary_width_rule(self, other);
        if let Some(x) = Self::propagate_unknown(self, other, width) {
            return Ok(x);
        }
        let a = self.set_width(width)?;
        let b = other.set_width(width)?;
        let neg_b = Self::negate_limbs(width, &b.limbs);
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, limb_count(width));
        let mut carry = 0u128;
        for i in 0..limbs.len() {
            let sum = a.limbs[i] as u128 + neg_b[i] as u128 + carry;
            limbs[i] = sum as u64;
            carry = sum >> 64;
        }
        let mut v = Self {
            width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, WideIntError> {
        let width = self.width + other.width;
        if let Some(x) = Self::propagate_unknown(self, other, width) {
            return Ok(x);
        }
        let result_limbs = limb_count(width);
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, result_limbs);
        for (i, &al) in self.limbs.iter().enumerate() {
            if al == 0 {
                continue;
            }
            let mut carry = 0u128;
            for (j, &bl) in other.limbs.iter().enumerate() {
                if i + j >= result_limbs {
                    break;
                }
                let idx = i + j;
                let prod = al as u128 * bl as u128 + limbs[idx] as u128 + carry;
                limbs[idx] = prod as u64;
                carry = prod >> 64;
            }
            let mut k = i + other.limbs.len();
            while carry != 0 && k < result_limbs {
                let sum = limbs[k] as u128 + carry;
                limbs[k] = sum as u64;
                carry = sum >> 64;
                k += 1;
            }
        }
        let mut v = Self {
            width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    fn cmp_unsigned_limbs(a: &[Limb], b: &[Limb]) -> Ordering {
        for i in (0..a.len().max(b.len())).rev() {
            let av = a.get(i).copied().unwrap_or(0);
            let bv = b.get(i).copied().unwrap_or(0);
            match av.cmp(&bv) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    fn shl1_inplace(limbs: &mut [Limb]) {
        let mut carry = 0u64;
        for limb in limbs.iter_mut() {
            let new_carry = *limb >> 63;
            *limb = (*limb << 1) | carry;
            carry = new_carry;
        }
    }

    fn set_bit(limbs: &mut [Limb], i: usize, value: bool) {
        let limb = i / LIMB_BITS as usize;
        let off = i % LIMB_BITS as usize;
        if value {
            limbs[limb] |= 1 << off;
        } else {
            limbs[limb] &= !(1u64 << off);
        }
    }

    fn get_bit_of(limbs: &[Limb], i: usize) -> bool {
        let limb = i / LIMB_BITS as usize;
        let off = i % LIMB_BITS as usize;
        limbs.get(limb).map(|l| (l >> off) & 1 == 1).unwrap_or(false)
    }

    fn sub_inplace(a: &mut [Limb], b: &[Limb]) {
        let mut borrow = 0i128;
        for i in 0..a.len() {
            let bv = b.get(i).copied().unwrap_or(0) as i128;
            let diff = a[i] as i128 - bv - borrow;
            if diff < 0 {
                a[i] = (diff + (1i128 << 64)) as u64;
                borrow = 1;
            } else {
                a[i] = diff as u64;
                borrow = 0;
            }
        }
    }

    /// Unsigned long division, bit by bit. `O(width)` but trivially correct
    /// for the moderate widths circuit-level values use.
    fn div_rem_unsigned_magnitude(
        width: u32,
        num: &[Limb],
        den: &[Limb],
    ) -> Option<(SmallVec<[Limb; 2]>, SmallVec<[Limb; 2]>)> {
        if den.iter().all(|&l| l == 0) {
            return None;
        }
        let lc = limb_count(width);
        let mut quotient: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, lc);
        let mut remainder: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, lc);
        for i in (0..width as usize).rev() {
            Self::shl1_inplace(&mut remainder);
            Self::set_bit(&mut remainder, 0, Self::get_bit_of(num, i));
            if Self::cmp_unsigned_limbs(&remainder, den) != Ordering::Less {
                Self::sub_inplace(&mut remainder, den);
                Self::set_bit(&mut quotient, i, true);
            }
        }
        Some((quotient, remainder))
    }

    fn div_rem(&self, other: &Self) -> Result<(Self, Self), WideIntError> {
        let width = self.width;
        if !self.known || !other.known {
            return Ok((Self::unknown(width)?, Self::unknown(width)?));
        }
        let signed = self.signed;
        let neg_a = signed && self.is_negative();
        let neg_b = signed && other.is_negative();
        let mag_a = if neg_a {
            Self::negate_limbs(self.width, &self.limbs)
        } else {
            self.limbs.clone()
        };
        let mag_b = if neg_b {
            Self::negate_limbs(other.width, &other.limbs)
        } else {
            other.limbs.clone()
        };
        let (q, r) =
            Self::div_rem_unsigned_magnitude(width, &mag_a, &mag_b)
                .ok_or(WideIntError::DivisionByZero)?;
        let q = if neg_a != neg_b {
            Self::negate_limbs(width, &q)
        } else {
            q
        };
        let r = if neg_a {
            Self::negate_limbs(width, &r)
        } else {
            r
        };
        let mut qv = Self {
            width,
            signed,
            known: true,
            limbs: q,
        };
        qv.mask_top_limb();
        let mut rv = Self {
            width,
            signed,
            known: true,
            limbs: r,
        };
        rv.mask_top_limb();
        Ok((qv, rv))
    }

    pub fn checked_div(&self, other: &Self) -> Result<Self, WideIntError> {
        self.div_rem(other).map(|(q, _)| q)
    }

    pub fn checked_rem(&self, other: &Self) -> Result<Self, WideIntError> {
        self.div_rem(other).map(|(_, r)| r)
    }

    fn bitop(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Result<Self, WideIntError> {
        let width = Self::binary_width_rule(self, other);
        if let Some(x) = Self::propagate_unknown(self, other, width) {
            return Ok(x);
        }
        let a = self.set_width(width)?;
        let b = other.set_width(width)?;
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, limb_count(width));
        for i in 0..limbs.len() {
            limbs[i] = f(a.limbs[i], b.limbs[i]);
        }
        let mut v = Self {
            width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        Ok(v)
    }

    pub fn bitand(&self, other: &Self) -> Result<Self, WideIntError> {
        self.bitop(other, |a, b| a & b)
    }

    pub fn bitor(&self, other: &Self) -> Result<Self, WideIntError> {
        self.bitop(other, |a, b| a | b)
    }

    pub fn bitxor(&self, other: &Self) -> Result<Self, WideIntError> {
        self.bitop(other, |a, b| a ^ b)
    }

    pub fn bitnot(&self) -> Self {
        let mut limbs = self.limbs.clone();
        for l in limbs.iter_mut() {
            *l = !*l;
        }
        let mut v = Self {
            width: self.width,
            signed: self.signed,
            known: self.known,
            limbs,
        };
        v.mask_top_limb();
        v
    }

    /// Logical shift left; the right operand's value is the shift amount.
    /// Bits shifted past the top of `width` are discarded.
    pub fn shl(&self, amount: u32) -> Self {
        if !self.known {
            return self.clone();
        }
        if amount >= self.width {
            return Self::from_u64(self.width, 0).expect("width already validated");
        }
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(0, self.limbs.len());
        for i in 0..self.width as usize {
            if i + amount as usize >= self.width as usize {
                break;
            }
            if Self::get_bit_of(&self.limbs, i) {
                Self::set_bit(&mut limbs, i + amount as usize, true);
            }
        }
        let mut v = Self {
            width: self.width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        v
    }

    /// Logical shift right, filling with zero.
    pub fn shr(&self, amount: u32) -> Self {
        self.shift_right(amount, false)
    }

    /// Arithmetic shift right. The fill bit is always the bit at position
    /// `width - 1` of the *current* value, independent of the `signed`
    /// interpretation flag (the positional invariant the spec calls out).
    pub fn asr(&self, amount: u32) -> Self {
        let fill = self.get_bit(self.width - 1);
        self.shift_right(amount, fill)
    }

    fn shift_right(&self, amount: u32, fill: bool) -> Self {
        if !self.known {
            return self.clone();
        }
        let mut limbs: SmallVec<[Limb; 2]> = SmallVec::from_elem(
            if fill { u64::MAX } else { 0 },
            self.limbs.len(),
        );
        if amount < self.width {
            for i in 0..self.width as usize {
                let src = i + amount as usize;
                let bit = if src < self.width as usize {
                    Self::get_bit_of(&self.limbs, src)
                } else {
                    fill
                };
                Self::set_bit(&mut limbs, i, bit);
            }
        }
        let mut v = Self {
            width: self.width,
            signed: self.signed,
            known: true,
            limbs,
        };
        v.mask_top_limb();
        v
    }

    fn magnitude_cmp(&self, other: &Self) -> Ordering {
        let width = self.width.max(other.width);
        if self.signed || other.signed {
            let neg_a = self.is_negative();
            let neg_b = other.signed && other.get_bit(other.width.saturating_sub(1));
            return match (neg_a, neg_b) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (true, true) => {
                    let ma = Self::negate_limbs(self.width, &self.limbs);
                    let mb = Self::negate_limbs(other.width, &other.limbs);
                    Self::cmp_unsigned_limbs(&ma, &mb).reverse()
                }
                (false, false) => {
                    let a = self.set_width(width).unwrap_or_else(|_| self.clone());
                    let b = other.set_width(width).unwrap_or_else(|_| other.clone());
                    Self::cmp_unsigned_limbs(&a.limbs, &b.limbs)
                }
            };
        }
        let a = self.set_width(width).unwrap_or_else(|_| self.clone());
        let b = other.set_width(width).unwrap_or_else(|_| other.clone());
        Self::cmp_unsigned_limbs(&a.limbs, &b.limbs)
    }

    pub fn eq_value(&self, other: &Self) -> bool {
        self.magnitude_cmp(other) == Ordering::Equal
    }

    pub fn lt(&self, other: &Self) -> bool {
        self.magnitude_cmp(other) == Ordering::Less
    }

    pub fn le(&self, other: &Self) -> bool {
        self.magnitude_cmp(other) != Ordering::Greater
    }

    pub fn gt(&self, other: &Self) -> bool {
        self.magnitude_cmp(other) == Ordering::Greater
    }

    pub fn ge(&self, other: &Self) -> bool {
        self.magnitude_cmp(other) != Ordering::Less
    }

    /// Decimal text; prints `X` for a value with any unknown bit.
    pub fn dec_print(&self) -> String {
        if !self.known {
            return "X".into();
        }
        if self.signed && self.is_negative() {
            let mag = Self::negate_limbs(self.width, &self.limbs);
            return format_decimal_limbs(&mag, true);
        }
        format_decimal_limbs(&self.limbs, false)
    }

    pub fn hex_print(&self) -> String {
        if !self.known {
            return "X".into();
        }
        let mut s = String::new();
        for limb in self.limbs.iter().rev() {
            s.push_str(&format!("{limb:016x}"));
        }
        let trimmed = s.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".into()
        } else {
            trimmed.into()
        }
    }

    pub fn bit_print(&self) -> String {
        if !self.known {
            return "X".repeat(self.width as usize);
        }
        let mut s = String::with_capacity(self.width as usize);
        for i in (0..self.width).rev() {
            s.push(if self.get_bit(i) { '1' } else { '0' });
        }
        s
    }
}

fn format_decimal_limbs(limbs: &[Limb], negative: bool) -> String {
    // Simple repeated-division-by-10 over the limb vector.
    let mut work: SmallVec<[Limb; 2]> = limbs.into();
    let mut digits = SmallVec::<[u8; 32]>::new();
    loop {
        let mut remainder: u128 = 0;
        let mut any_nonzero = false;
        for limb in work.iter_mut().rev() {
            let cur = (remainder << 64) | *limb as u128;
            *limb = (cur / 10) as u64;
            remainder = cur % 10;
            if *limb != 0 {
                any_nonzero = true;
            }
        }
        digits.push(remainder as u8);
        if !any_nonzero {
            break;
        }
    }
    let mut s = String::new();
    if negative {
        s.push('-');
    }
    for d in digits.iter().rev() {
        s.push((b'0' + d) as char);
    }
    s
}

impl fmt::Display for WideInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dec_print())
    }
}
