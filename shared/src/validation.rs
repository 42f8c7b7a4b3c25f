//! Validation utilities for the Commerce Management Platform
//!
//! Includes Chile-specific validations for compliance with local tax rules.

use rust_decimal::Decimal;

// ============================================================================
// Purchase Order Validations
// ============================================================================

/// Validate an order line's quantity
pub fn validate_line_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Validate an order line's unit price
pub fn validate_unit_price(unit_price: Decimal) -> Result<(), &'static str> {
    if unit_price <= Decimal::ZERO {
        return Err("Unit price must be greater than zero");
    }
    Ok(())
}

/// Validate a line discount is within 0..=100 percent
pub fn validate_discount_percent(discount: Decimal) -> Result<(), &'static str> {
    if discount < Decimal::ZERO {
        return Err("Discount percent cannot be negative");
    }
    if discount > Decimal::from(100) {
        return Err("Discount percent cannot exceed 100");
    }
    Ok(())
}

/// Validate a tax percentage (VAT) is within 0..=100
pub fn validate_tax_percent(tax: Decimal) -> Result<(), &'static str> {
    if tax < Decimal::ZERO || tax > Decimal::from(100) {
        return Err("Tax percent must be between 0 and 100");
    }
    Ok(())
}

/// Validate an order-level discount amount is non-negative
pub fn validate_order_discount(discount: Decimal) -> Result<(), &'static str> {
    if discount < Decimal::ZERO {
        return Err("Order discount cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Inventory Validations
// ============================================================================

/// Validate a movement quantity (stored magnitude, always positive)
pub fn validate_movement_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Movement quantity must be greater than zero");
    }
    Ok(())
}

/// Validate a signed adjustment quantity is not zero
pub fn validate_adjustment_quantity(signed_quantity: i32) -> Result<(), &'static str> {
    if signed_quantity == 0 {
        return Err("Adjustment quantity cannot be zero");
    }
    Ok(())
}

// ============================================================================
// Chile-Specific Validations
// ============================================================================

/// Validate a Chilean RUT (Rol Único Tributario)
/// Accepts: 12.345.678-5, 12345678-5, 123456785
/// Verifies the modulo-11 check digit ('K' allowed).
pub fn validate_rut(rut: &str) -> Result<(), &'static str> {
    let cleaned: String = rut
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();

    if cleaned.len() < 2 || cleaned.len() > 9 {
        return Err("RUT must have between 2 and 9 characters");
    }

    let (body, check) = cleaned.split_at(cleaned.len() - 1);
    if !body.chars().all(|c| c.is_ascii_digit()) {
        return Err("RUT body must be numeric");
    }

    // Modulo 11 with cyclic weights 2..=7 from the rightmost digit
    let mut sum: u32 = 0;
    let mut weight: u32 = 2;
    for c in body.chars().rev() {
        sum += c.to_digit(10).unwrap_or(0) * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }

    let expected = match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        n => char::from_digit(n, 10).unwrap_or('0'),
    };

    if check.chars().next() != Some(expected) {
        return Err("Invalid RUT check digit");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    // ========================================================================
    // Purchase Order Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_line_quantity() {
        assert!(validate_line_quantity(1).is_ok());
        assert!(validate_line_quantity(100).is_ok());
        assert!(validate_line_quantity(0).is_err());
        assert!(validate_line_quantity(-5).is_err());
    }

    #[test]
    fn test_validate_unit_price() {
        assert!(validate_unit_price(dec("0.01")).is_ok());
        assert!(validate_unit_price(dec("0")).is_err());
        assert!(validate_unit_price(dec("-10")).is_err());
    }

    #[test]
    fn test_validate_discount_percent() {
        assert!(validate_discount_percent(dec("0")).is_ok());
        assert!(validate_discount_percent(dec("50")).is_ok());
        assert!(validate_discount_percent(dec("100")).is_ok());
        assert!(validate_discount_percent(dec("-1")).is_err());
        assert!(validate_discount_percent(dec("100.01")).is_err());
    }

    #[test]
    fn test_validate_tax_percent() {
        assert!(validate_tax_percent(dec("19")).is_ok());
        assert!(validate_tax_percent(dec("0")).is_ok());
        assert!(validate_tax_percent(dec("101")).is_err());
    }

    #[test]
    fn test_validate_order_discount() {
        assert!(validate_order_discount(dec("0")).is_ok());
        assert!(validate_order_discount(dec("150.75")).is_ok());
        assert!(validate_order_discount(dec("-0.01")).is_err());
    }

    // ========================================================================
    // Inventory Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_movement_quantity() {
        assert!(validate_movement_quantity(5).is_ok());
        assert!(validate_movement_quantity(0).is_err());
        assert!(validate_movement_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_adjustment_quantity() {
        assert!(validate_adjustment_quantity(10).is_ok());
        assert!(validate_adjustment_quantity(-10).is_ok());
        assert!(validate_adjustment_quantity(0).is_err());
    }

    // ========================================================================
    // Chile-Specific Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_rut_valid() {
        // 12.345.678-5 has check digit 5
        assert!(validate_rut("12.345.678-5").is_ok());
        assert!(validate_rut("12345678-5").is_ok());
        assert!(validate_rut("123456785").is_ok());
    }

    #[test]
    fn test_validate_rut_with_k_digit() {
        // 20.347.315-K carries the K check digit
        assert!(validate_rut("20.347.315-K").is_ok());
        assert!(validate_rut("20347315k").is_ok());
    }

    #[test]
    fn test_validate_rut_invalid() {
        assert!(validate_rut("12.345.678-9").is_err()); // Wrong check digit
        assert!(validate_rut("1").is_err()); // Too short
        assert!(validate_rut("ABCDEFGH-5").is_err()); // Non-numeric body
    }
}
