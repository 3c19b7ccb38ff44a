use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Language;
use crate::judge::TestCase;

const CPP_TEMPLATE: &str = r#"#include <iostream>

using namespace std;

int main() {
    int a, b;
    if (cin >> a >> b) {
        cout << a + b << endl;
    }
    return 0;
}"#;

const PYTHON_TEMPLATE: &str = r#"import sys

data = sys.stdin.read().split()
if len(data) >= 2:
    print(int(data[0]) + int(data[1]))"#;

const JAVA_TEMPLATE: &str = r#"import java.util.Scanner;

public class Main {
    public static void main(String[] args) {
        Scanner scanner = new Scanner(System.in);
        if (scanner.hasNextInt()) {
            int a = scanner.nextInt();
            int b = scanner.nextInt();
            System.out.println(a + b);
        }
        scanner.close();
    }
}"#;

/// Starter program for a language: read two integers, print their sum
pub fn template_for(language: Language) -> &'static str {
    match language {
        Language::Cpp => CPP_TEMPLATE,
        Language::Python => PYTHON_TEMPLATE,
        Language::Java => JAVA_TEMPLATE,
    }
}

/// Everything the editor needs to come back where the user left off
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub language: Language,
    pub codes: BTreeMap<Language, String>,
    pub test_cases: Vec<TestCase>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            language: Language::Cpp,
            codes: Language::ALL
                .iter()
                .map(|&language| (language, template_for(language).to_string()))
                .collect(),
            test_cases: vec![TestCase::seed()],
        }
    }
}

impl SessionState {
    /// Fills in languages a stored session did not know about
    pub fn with_missing_templates(mut self) -> Self {
        for language in Language::ALL {
            self.codes
                .entry(language)
                .or_insert_with(|| template_for(language).to_string());
        }
        self
    }
}
