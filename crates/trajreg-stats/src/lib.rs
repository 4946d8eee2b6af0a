//! Numeric building blocks for trajectory regression analysis.
//!
//! This crate provides the statistics the regression engine leans on:
//!
//! - **Descriptive statistics**: NaN-aware mean, median, sample standard deviation
//! - **Smoothing**: Gaussian smoothing of evenly sampled series
//! - **Regression**: the single-regression solver contract and a reference solver
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`smoothing`]: Gaussian kernel smoothing
//! - [`regression`]: [`RegressionSolver`](regression::RegressionSolver) and its built-in
//!   implementation
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use trajreg_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Running a regression
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use trajreg_stats::regression::{
//!     ReferenceSolver, RegressionFamily, RegressionSolver, SolverOptions,
//! };
//!
//! let x = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
//! let y = DVector::from_column_slice(&[2.0, 4.0, 6.0, 8.0]);
//! let output = ReferenceSolver
//!     .solve(RegressionFamily::Ols, &x, &y, &SolverOptions::default())
//!     .unwrap();
//! assert!((output.coefficients[1].estimate - 2.0).abs() < 1e-9);
//! ```

pub mod descriptive;
pub mod regression;
pub mod smoothing;
