use crate::parser::Command;

/// Translate a command and its primary target into a user-POV sentence for
/// the run report.
pub fn generate(command: Command, target: &str) -> String {
    let target = target.trim();

    match command {
        Command::OpenApp => format!(
            "User memulai sesi dengan membuka aplikasi paket '{}'.",
            target
        ),

        Command::InputText => format!("User mengisi data '{}' pada formulir yang tersedia.", target),

        Command::Tap => {
            let lower = target.to_lowercase();
            if lower.contains("simpan") || lower.contains("submit") {
                format!("User menyimpan perubahan dengan menekan tombol '{}'.", target)
            } else if lower.contains("batal") || lower.contains("cancel") {
                format!("User membatalkan aksi dengan menekan tombol '{}'.", target)
            } else if lower.contains("fab") || lower.contains("tambah") {
                "User memulai aktivitas baru dengan menekan tombol Tambah (FAB).".to_string()
            } else {
                format!("User memilih menu atau tombol '{}'.", target)
            }
        }

        Command::PressKey => {
            let key = target.to_lowercase();
            if key.contains("back") {
                "User menekan tombol Kembali (Back) di perangkat.".to_string()
            } else if key.contains("home") {
                "User kembali ke layar utama (Home Screen).".to_string()
            } else if key.contains("enter") {
                "User menekan tombol Enter pada keyboard.".to_string()
            } else {
                format!("User menekan tombol fisik '{}'.", target)
            }
        }

        Command::SaveText => format!(
            "Sistem membaca dan mengingat informasi dari elemen '{}'.",
            target
        ),

        Command::WaitFor => format!("Sistem menunggu hingga elemen '{}' siap di layar.", target),

        Command::AssertSoft => format!(
            "Sistem memverifikasi bahwa teks '{}' tampil valid di layar.",
            target
        ),

        Command::AssertHard => format!(
            "Sistem memastikan teks '{}' wajib tampil di layar.",
            target
        ),

        Command::Scroll => format!(
            "User melakukan navigasi dengan menggulir layar ke '{}'.",
            target
        ),
    }
}
