//! Display catalog shared by backend normalization and demo samples
//!
//! Index positions are part of the contract with the dashboard, do not
//! reorder.

use crate::logic::types::{Signature, Vendor};

pub const VENDORS: &[(&str, &str)] = &[
    ("Google", "fab fa-google"),
    ("VirusTotal", "fas fa-shield-virus"),
    ("Microsoft", "fab fa-windows"),
    ("CrowdStrike", "fas fa-crow"),
    ("SentinelOne", "fas fa-satellite-dish"),
    ("Palo Alto Networks", "fas fa-fire-wall"),
    ("McAfee", "fas fa-shield-alt"),
    ("Symantec (Broadcom)", "fas fa-shield-alt"),
    ("Kaspersky", "fas fa-shield-alt"),
    ("ESET", "fas fa-shield-alt"),
    ("Malwarebytes", "fas fa-shield-alt"),
    ("Sophos", "fas fa-shield-alt"),
    ("Trend Micro", "fas fa-shield-alt"),
    ("FireEye (Trellix)", "fas fa-fire"),
    ("Zscaler", "fas fa-cloud"),
    ("Cisco Talos", "fas fa-shield-alt"),
    ("Avast", "fas fa-shield-alt"),
    ("Bitdefender", "fas fa-shield-alt"),
    ("Fortinet", "fas fa-fort-awesome"),
    ("Check Point", "fas fa-shield-alt"),
];

pub const SIGNATURES: &[(&str, &str, &str)] = &[
    ("Verified (Microsoft Corporation)", "fas fa-check-shield", "verified"),
    ("Verified (Google LLC)", "fas fa-check-shield", "verified"),
    ("Verified (Notepad++ team)", "fas fa-check-shield", "verified"),
    ("Verified (Unknown Publisher)", "fas fa-exclamation-triangle", "unknown"),
    ("Not Signed", "fas fa-times-circle", "untrusted"),
    ("Expired Certificate", "fas fa-exclamation-triangle", "untrusted"),
    ("Self-Signed (Untrusted)", "fas fa-times-circle", "untrusted"),
];

pub const FILE_TYPES: &[&str] = &[
    "PE32+ (GUI) x86-64",
    "PE32 (Console) Intel 80386",
    "PE32+ DLL x86-64",
    "MSI Installer",
    "PDF Document",
    "ELF 64-bit LSB executable",
    "Mach-O 64-bit executable x86_64",
];

pub const PACKERS: &[&str] = &["None", "UPX", "VMProtect", "Themida", "ASPack", "Unknown (High Entropy)"];

pub const MALWARE_FAMILIES: &[&str] = &[
    "Trojan.Downloader.Win32",
    "Masquerader.Win32.Agent",
    "Ransomware.Win32.Locky",
    "Worm.Win32.Autorun",
    "Spyware.Win32.Keylogger",
    "Backdoor.Win32.Gh0st",
    "PUA.Win32.Adware",
    "Dropper.Win32.Emotet",
];

pub const API_SETS: &[&[&str]] = &[
    // benign
    &["ReadFile", "WriteFile", "CloseHandle"],
    &["CreateFileW", "HeapAlloc", "HeapFree"],
    &["Socket", "Connect", "Send", "Recv"],
    // suspicious
    &["SetWindowsHookExW", "GetMessageW"],
    &["WriteProcessMemory", "ReadProcessMemory", "OpenProcess"],
    &["URLDownloadToFileW", "WinExec"],
    &["RegSetValueExW", "CopyFileW", "SetFileAttributesW"],
    // malware
    &["CreateRemoteThread", "VirtualAllocEx", "WriteProcessMemory"],
    &["CryptGenKey", "CryptEncrypt", "DeleteFileW"],
    &["NtInjectThread", "OpenProcess", "VirtualAllocEx"],
    &["Socket", "URLDownloadToFileW", "CreateRemoteThread", "WinExec"],
];

pub const SUSPICIOUS_STRINGS: &[&str] = &[
    "http://bad-c2-server.com/payload.dat",
    "/temp/vbc.exe",
    "keylog.txt",
    "steal_passwords",
    ".locked",
    "HOW_TO_DECRYPT.txt",
    "vssadmin.exe delete shadows",
    "RSA-2048",
    "autorun.inf",
    "[autorun]",
    "open=update.exe",
    "powershell -enc",
    "IEX",
    "crack",
    "patch",
    "disable_antivirus",
    "Embedded EXE",
    "CustomAction",
    "RunPowerShellScript",
    "bot_id=",
    "GetProcAddress",
    "LoadLibraryA",
];

pub const BENIGN_STRINGS: &[&str] = &[
    "Microsoft Visual C++ Redistributable",
    "Notepad++",
    "Scintilla",
    "Calculator",
    "CreateFileW",
    "WriteFile",
    "ReadFile",
    "Windows Sockets 2.0 32-bit",
];

pub const ENTROPY_SECTIONS: &[&str] = &[".text", ".data", ".rsrc", "UPX0", "UPX1", ".reloc"];

/// Vendor at `index`, falling back to the in-house engine entry
pub fn vendor(index: usize) -> Vendor {
    let (name, icon) = VENDORS.get(index).copied().unwrap_or(VENDORS[15]);
    Vendor {
        name: name.to_string(),
        icon: icon.to_string(),
    }
}

/// Signature at `index`, falling back to "Not Signed"
pub fn signature(index: usize) -> Signature {
    let (name, icon, level) = SIGNATURES.get(index).copied().unwrap_or(SIGNATURES[4]);
    Signature {
        name: name.to_string(),
        icon: icon.to_string(),
        level: level.to_string(),
    }
}
